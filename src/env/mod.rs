//! Environment traits and implementations
//!
//! This module defines the core environment interface, the grid game adapter
//! that wraps a game engine episode, and the vectorized manager used for
//! rollout collection.

use anyhow::Result;

/// Core trait for RL environments
pub trait Environment {
    /// Observation type
    type Observation;

    /// Action type
    type Action;

    /// Reset the environment and return initial observation
    fn reset(&mut self) -> Result<Self::Observation>;

    /// Step the environment with an action
    fn step(&mut self, action: Self::Action) -> Result<StepResult<Self::Observation>>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepResult<O> {
    /// Next observation
    pub observation: O,

    /// Reward received
    pub reward: f32,

    /// Whether the episode terminated
    pub terminated: bool,

    /// Whether the episode was truncated
    pub truncated: bool,

    /// Additional info
    pub info: StepInfo,
}

impl<O> StepResult<O> {
    /// True when the episode ended for any reason
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Space information for observations and actions
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: SpaceType,
}

impl SpaceInfo {
    /// Number of scalar elements in one sample
    pub fn flat_len(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space (Box)
    Continuous,
}

/// Additional step information
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Engine verdict for the step, if the engine reported one
    pub winner: Option<Winner>,

    /// Whether the level being played failed to compile
    pub invalid_level: bool,

    /// Episode summary, set by [`monitor::Monitor`] on the final step
    pub episode: Option<EpisodeStats>,

    /// Observation that ended the episode, set by vectorized managers that
    /// auto-reset finished environments
    pub terminal_observation: Option<Vec<f32>>,
}

/// Summary of a finished episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    /// Sum of rewards over the episode
    pub reward: f32,

    /// Number of steps taken
    pub length: usize,

    /// Seconds since the monitor was created
    pub elapsed_secs: f64,
}

pub mod definition;
pub mod engine;
pub mod game;
pub mod grid;
pub mod maze;
pub mod monitor;
pub mod source;
pub mod vec;

pub use definition::{EnvDefinition, MazeDefinition};
pub use engine::{EngineStep, EngineVariant, GameEngine, LevelSpec, Winner};
pub use game::{Compilation, GridGame};
pub use grid::Grid;
