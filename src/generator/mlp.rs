//! Multi-layer perceptron level generator
//!
//! # Architecture
//!
//! ```text
//! z [batch, z_size]
//!         |
//!   [Dense(hidden)]
//!         |
//!       ReLU
//!         |
//!   [Dense(tiles * height * width)]
//!         |
//!   view [batch, tiles, height, width]
//!         |
//!   softmax over tiles
//! ```
//!
//! The adapter drops the last tile channel (floor), pads the remaining sprite
//! channels to the state shape and appends a background channel, matching
//! what the grid environment produces from an engine observation.

use anyhow::{Result, anyhow};
use tch::{
    Device, Kind, Tensor,
    nn::{self, Module},
};

use super::LevelGenerator;

/// Configuration for [`MlpGenerator`]
#[derive(Debug, Clone)]
pub struct MlpGeneratorConfig {
    /// Latent vector length
    pub z_size: i64,

    /// Hidden layer width
    pub hidden_dim: i64,

    /// Tile channels, floor last
    pub tiles: usize,

    /// Generated level height
    pub height: usize,

    /// Generated level width
    pub width: usize,

    /// Adapter output shape `[channels, height, width]`
    pub state_shape: [usize; 3],
}

impl Default for MlpGeneratorConfig {
    fn default() -> Self {
        Self { z_size: 32, hidden_dim: 256, tiles: 5, height: 7, width: 11, state_shape: [5, 7, 11] }
    }
}

impl MlpGeneratorConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.z_size <= 0 {
            return Err(anyhow!("z_size must be positive"));
        }
        if self.hidden_dim <= 0 {
            return Err(anyhow!("hidden_dim must be positive"));
        }
        if self.tiles < 2 {
            return Err(anyhow!("tiles must include at least one sprite and the floor"));
        }
        if self.height == 0 || self.width == 0 {
            return Err(anyhow!("level dimensions must be positive"));
        }
        let [channels, height, width] = self.state_shape;
        if channels != self.tiles {
            return Err(anyhow!(
                "state has {} channels, expected {} sprites plus background",
                channels,
                self.tiles - 1
            ));
        }
        if height < self.height || width < self.width {
            return Err(anyhow!(
                "state {}x{} is smaller than the generated level {}x{}",
                height,
                width,
                self.height,
                self.width
            ));
        }
        Ok(())
    }

    /// Set latent size
    pub fn z_size(mut self, z_size: i64) -> Self {
        self.z_size = z_size;
        self
    }

    /// Set hidden layer width
    pub fn hidden_dim(mut self, hidden_dim: i64) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Set tile count and level size
    pub fn level(mut self, tiles: usize, height: usize, width: usize) -> Self {
        self.tiles = tiles;
        self.height = height;
        self.width = width;
        self
    }

    /// Set adapter output shape
    pub fn state_shape(mut self, state_shape: [usize; 3]) -> Self {
        self.state_shape = state_shape;
        self
    }
}

/// Feedforward generator producing softmax tile distributions
pub struct MlpGenerator {
    vs: nn::VarStore,
    net: nn::Sequential,
    config: MlpGeneratorConfig,
}

impl MlpGenerator {
    /// Build a generator on `device`
    pub fn new(config: MlpGeneratorConfig, device: Device) -> Result<Self> {
        config.validate()?;
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let cells = (config.tiles * config.height * config.width) as i64;

        let net = nn::seq()
            .add(nn::linear(&root / "fc1", config.z_size, config.hidden_dim, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(&root / "tiles", config.hidden_dim, cells, Default::default()));

        tracing::debug!(device = ?device, z_size = config.z_size, "built MLP generator");
        Ok(Self { vs, net, config })
    }

    /// Configuration
    pub fn config(&self) -> &MlpGeneratorConfig {
        &self.config
    }
}

impl LevelGenerator for MlpGenerator {
    fn z_size(&self) -> i64 {
        self.config.z_size
    }

    fn state_shape(&self) -> [usize; 3] {
        self.config.state_shape
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    fn forward(&self, z: &Tensor) -> Tensor {
        let batch = z.size()[0];
        let c = &self.config;
        self.net
            .forward(z)
            .view([batch, c.tiles as i64, c.height as i64, c.width as i64])
            .softmax(1, Kind::Float)
    }

    fn adapter(&self, levels: &Tensor) -> Tensor {
        let size = levels.size();
        let sprites = levels.narrow(1, 0, size[1] - 1);

        let [_, height, width] = self.config.state_shape;
        let pad_h = (height as i64 - size[2]).max(0);
        let pad_w = (width as i64 - size[3]).max(0);
        let (top, left) = (pad_h / 2, pad_w / 2);
        let sprites = sprites.constant_pad_nd([left, pad_w - left, top, pad_h - top]);

        let background = 1.0 - sprites.sum_dim_intlist(1, true, Kind::Float).clamp(0.0, 1.0);
        Tensor::cat(&[sprites, background], 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(config: MlpGeneratorConfig) -> MlpGenerator {
        MlpGenerator::new(config, Device::Cpu).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(MlpGeneratorConfig::new().validate().is_ok());
        assert!(MlpGeneratorConfig::new().z_size(0).validate().is_err());
        assert!(MlpGeneratorConfig::new().state_shape([4, 7, 11]).validate().is_err());
        assert!(MlpGeneratorConfig::new().state_shape([5, 5, 11]).validate().is_err());
    }

    #[test]
    fn test_forward_is_tile_distribution() {
        let g = generator(MlpGeneratorConfig::default());
        let z = Tensor::randn([3, 32], (Kind::Float, Device::Cpu));
        let probs = g.forward(&z);
        assert_eq!(probs.size(), vec![3, 5, 7, 11]);

        let total = probs.sum_dim_intlist(1, false, Kind::Float);
        let ones = Tensor::ones([3, 7, 11], (Kind::Float, Device::Cpu));
        assert!(total.allclose(&ones, 1e-5, 1e-5, false));
    }

    #[test]
    fn test_adapter_pads_and_adds_background() {
        let config = MlpGeneratorConfig::new().level(5, 5, 8).state_shape([5, 7, 11]);
        let g = generator(config);
        let z = Tensor::randn([2, 32], (Kind::Float, Device::Cpu));
        let (levels, states) = g.generate(&z);
        assert_eq!(levels.size(), vec![2, 5, 5, 8]);
        assert_eq!(states.size(), vec![2, 5, 7, 11]);

        // padded border is pure background
        let corner = Vec::<f32>::try_from(&states.get(0).select(2, 0).select(1, 0).contiguous()).unwrap();
        assert_eq!(corner, vec![0.0, 0.0, 0.0, 0.0, 1.0]);

        // every cell has exactly one active channel for a one-hot level
        let per_cell = states.sum_dim_intlist(1, false, Kind::Float);
        let ones = Tensor::ones([2, 7, 11], (Kind::Float, Device::Cpu));
        assert!(per_cell.allclose(&ones, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_generate_is_one_hot() {
        let g = generator(MlpGeneratorConfig::default());
        let z = Tensor::rand([4, 32], (Kind::Float, Device::Cpu));
        let (levels, _) = g.generate(&z);
        let per_cell = levels.sum_dim_intlist(1, false, Kind::Float);
        let ones = Tensor::ones([4, 7, 11], (Kind::Float, Device::Cpu));
        assert!(per_cell.allclose(&ones, 1e-6, 1e-6, false));
        assert!(!levels.requires_grad());
    }

    #[test]
    fn test_adapter_is_differentiable() {
        let g = generator(MlpGeneratorConfig::default());
        let z = Tensor::randn([2, 32], (Kind::Float, Device::Cpu));
        let states = g.adapter(&g.forward(&z));
        assert!(states.requires_grad());
        states.narrow(1, 0, 4).sum(Kind::Float).backward();

        let grads: f64 = g
            .var_store()
            .trainable_variables()
            .iter()
            .map(|v| v.grad().abs().sum(Kind::Float).double_value(&[]))
            .sum();
        assert!(grads > 0.0);
    }
}
