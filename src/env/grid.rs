//! Dense multi-channel grids
//!
//! Game engines report their state as a stack of binary sprite layers
//! `[channels, height, width]`. The grid adapter turns that raw stack into a
//! fixed-shape observation by padding it to the configured size and appending
//! a derived background layer.

use anyhow::{Result, bail};

/// Row-major `[channels, height, width]` grid of `f32` cells
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl Grid {
    /// Create an all-zero grid
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self { channels, height, width, data: vec![0.0; channels * height * width] }
    }

    /// Wrap existing row-major data
    ///
    /// Fails if `data.len()` does not equal `channels * height * width`.
    pub fn from_vec(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let expected = channels * height * width;
        if data.len() != expected {
            bail!(
                "grid data has {} cells, expected {} for shape [{}, {}, {}]",
                data.len(),
                expected,
                channels,
                height,
                width
            );
        }
        Ok(Self { channels, height, width, data })
    }

    /// Shape as `[channels, height, width]`
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.width
    }

    /// Raw row-major cells
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume the grid and return its cells
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    fn index(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.height + y) * self.width + x
    }

    /// Read one cell
    pub fn get(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[self.index(c, y, x)]
    }

    /// Write one cell
    pub fn set(&mut self, c: usize, y: usize, x: usize, value: f32) {
        let i = self.index(c, y, x);
        self.data[i] = value;
    }

    /// Zero-pad the spatial dimensions up to `height` x `width`
    ///
    /// Padding is split evenly between the leading and trailing edge; an odd
    /// unit goes to the trailing edge. Dimensions already at or above the
    /// target are left unchanged.
    pub fn pad_to(&self, height: usize, width: usize) -> Grid {
        let pad_h = height.saturating_sub(self.height);
        let pad_w = width.saturating_sub(self.width);
        let (top, left) = (pad_h / 2, pad_w / 2);

        let mut out = Grid::zeros(self.channels, self.height + pad_h, self.width + pad_w);
        for c in 0..self.channels {
            for y in 0..self.height {
                let src = self.index(c, y, 0);
                let dst = out.index(c, y + top, left);
                out.data[dst..dst + self.width].copy_from_slice(&self.data[src..src + self.width]);
            }
        }
        out
    }

    /// Append a background channel
    ///
    /// The new channel is `1 - clamp(sum over channels, 0, 1)` for every
    /// cell, so it is active exactly where no other layer is.
    pub fn with_background(&self) -> Grid {
        let plane = self.height * self.width;
        let mut data = Vec::with_capacity(self.data.len() + plane);
        data.extend_from_slice(&self.data);

        for cell in 0..plane {
            let occupied: f32 = (0..self.channels).map(|c| self.data[c * plane + cell]).sum();
            data.push(1.0 - occupied.clamp(0.0, 1.0));
        }

        Grid { channels: self.channels + 1, height: self.height, width: self.width, data }
    }
}
