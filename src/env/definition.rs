//! Environment definitions
//!
//! An [`EnvDefinition`] describes one game: how long an episode may run, the
//! observation shape, how to create engine handles, and how to turn a
//! generator's tile tensor into ascii levels.

use anyhow::{Result, bail};
use tch::{Device, Kind, Tensor};

use super::{
    engine::{EngineVariant, GameEngine},
    maze::{FLOOR, MazeEngine, MazeLevel, NUM_ACTIONS, SPRITES},
};

/// Description of a grid game
pub trait EnvDefinition: Send + Sync {
    /// Game name
    fn name(&self) -> &str;

    /// Episode horizon in steps
    fn play_length(&self) -> usize;

    /// Observation shape `[channels, height, width]`, background included
    fn state_shape(&self) -> [usize; 3];

    /// Number of discrete actions
    fn num_actions(&self) -> usize;

    /// Create an engine handle
    fn make_engine(&self, variant: EngineVariant) -> Result<Box<dyn GameEngine>>;

    /// Decode a `[batch, tiles, height, width]` tile tensor into ascii levels
    fn create_levels(&self, levels: &Tensor) -> Result<Vec<String>>;

    /// Cheap validity check on an ascii level, without running the engine
    fn pass_requirements(&self, level: &str) -> bool;
}

/// Size and horizon of generated mazes
#[derive(Debug, Clone)]
pub struct MazeConfig {
    /// Level height in cells
    pub height: usize,

    /// Level width in cells
    pub width: usize,

    /// Episode horizon
    pub play_length: usize,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self { height: 7, width: 11, play_length: 50 }
    }
}

/// [`EnvDefinition`] for the built-in maze game
#[derive(Debug, Clone, Default)]
pub struct MazeDefinition {
    config: MazeConfig,
}

impl MazeDefinition {
    /// Tile symbols in generator channel order: every sprite, then floor
    pub const TILES: [char; 5] = [SPRITES[0], SPRITES[1], SPRITES[2], SPRITES[3], FLOOR];

    /// Create a definition
    pub fn new(config: MazeConfig) -> Self {
        Self { config }
    }

    /// Number of generator tile channels
    pub fn num_tiles() -> usize {
        Self::TILES.len()
    }
}

impl EnvDefinition for MazeDefinition {
    fn name(&self) -> &str {
        "maze"
    }

    fn play_length(&self) -> usize {
        self.config.play_length
    }

    fn state_shape(&self) -> [usize; 3] {
        [SPRITES.len() + 1, self.config.height, self.config.width]
    }

    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }

    fn make_engine(&self, variant: EngineVariant) -> Result<Box<dyn GameEngine>> {
        Ok(Box::new(MazeEngine::new(variant)?))
    }

    fn create_levels(&self, levels: &Tensor) -> Result<Vec<String>> {
        let size = levels.size();
        if size.len() != 4 || size[1] as usize != Self::num_tiles() {
            bail!("expected [batch, {}, height, width] tile tensor, got {:?}", Self::num_tiles(), size);
        }
        let (batch, height, width) = (size[0] as usize, size[2] as usize, size[3] as usize);

        let indices = levels
            .argmax(1, false)
            .to_kind(Kind::Int64)
            .to_device(Device::Cpu)
            .contiguous()
            .view([-1]);
        let indices = Vec::<i64>::try_from(&indices)?;

        let strings = indices
            .chunks(height * width)
            .take(batch)
            .map(|level| {
                level
                    .chunks(width)
                    .map(|row| row.iter().map(|&t| Self::TILES[t as usize]).collect::<String>())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect();
        Ok(strings)
    }

    fn pass_requirements(&self, level: &str) -> bool {
        match MazeLevel::parse(level) {
            Ok(maze) => {
                maze.height() <= self.config.height
                    && maze.width() <= self.config.width
                    && level.contains(SPRITES[2])
            }
            Err(_) => false,
        }
    }
}
