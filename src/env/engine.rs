//! Game engine interface
//!
//! A [`GameEngine`] is one handle onto the underlying simulator. It loads a
//! level, runs an episode one action at a time and reports the raw sprite
//! grid after every step. The grid adapter in [`super::game`] owns exactly
//! one handle and replaces it when a level breaks the engine.

use anyhow::Result;

use super::grid::Grid;

/// Outcome of an episode as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The avatar won
    PlayerWins,

    /// The avatar lost
    PlayerLoses,

    /// The episode has not been decided
    NoWinner,
}

/// Which level an engine should play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelSpec {
    /// One of the engine's built-in levels
    BuiltIn(usize),

    /// A symbolic (ascii) level description
    Ascii(String),
}

/// Flavour of engine handle to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineVariant {
    /// Regular handle used for training
    Primary,

    /// Neutral handle created after a level broke the primary one
    Fallback,
}

/// Raw result of one engine step
#[derive(Debug, Clone)]
pub struct EngineStep {
    /// Sprite layers after the step, one channel per sprite type
    pub grid: Grid,

    /// Whether the engine considers the episode over
    pub done: bool,

    /// Engine verdict
    pub winner: Winner,
}

/// One handle onto a grid game simulator
pub trait GameEngine: Send {
    /// Load the given level; it becomes active on the next [`reset`]
    ///
    /// [`reset`]: GameEngine::reset
    fn load_level(&mut self, level: &LevelSpec) -> Result<()>;

    /// Start a new episode on the loaded level
    fn reset(&mut self) -> Result<()>;

    /// Apply one action
    fn step(&mut self, action: i64) -> Result<EngineStep>;

    /// Number of built-in levels
    fn builtin_levels(&self) -> usize;

    /// Number of discrete actions
    fn num_actions(&self) -> usize;
}
