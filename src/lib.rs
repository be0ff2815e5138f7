//! # Levelforge
//!
//! Co-training of a procedural level generator and a reinforcement learning
//! agent on grid games.
//!
//! The generator proposes levels, the agent learns to play them, and the
//! agent's critic tells the generator which levels look worth playing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use levelforge::prelude::*;
//! use tch::Device;
//!
//! # fn main() -> anyhow::Result<()> {
//! let definition: Arc<dyn EnvDefinition> = Arc::new(MazeDefinition::default());
//! let generator = MlpGenerator::new(MlpGeneratorConfig::new(), Device::Cpu)?;
//! let agent = PpoAgent::new(definition.clone(), AgentConfig::new(), Device::Cpu)?;
//! let config = TrainerConfig::new().save_dir("runs/maze").device(Device::Cpu);
//!
//! let mut trainer = CoTrainer::new(generator, agent, definition, config)?;
//! trainer.train(100, 32, 512)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Grid games, level sources and vectorized environments
pub mod env;

/// Scratch level pool and elite ranking
pub mod levels;

/// Differentiable level generators
pub mod generator;

/// Reinforcement learning agents
pub mod agent;

/// Co-training loop
pub mod train;

/// Utility functions and helpers
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        agent::{ActorCritic, Agent, AgentConfig, PpoAgent},
        env::{EnvDefinition, GridGame, MazeDefinition},
        generator::{LevelGenerator, MlpGenerator, MlpGeneratorConfig},
        levels::{EliteSet, LevelPool},
        train::{CoTrainer, Phase, TrainerConfig},
    };
}

/// Current version of levelforge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
