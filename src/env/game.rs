//! Grid game adapter
//!
//! [`GridGame`] wraps one engine handle and turns it into an [`Environment`]
//! with a fixed observation shape and a sparse, shaped terminal reward.
//!
//! # Reward
//!
//! ```text
//! win:          1.1 - steps / play_length
//! loss/timeout: -1.1 + steps / play_length
//! otherwise:    0
//! ```
//!
//! Fast wins earn more, slow losses cost less. Levels that fail to load or
//! crash the engine are marked [`Compilation::Invalid`]; until the next reset
//! every step ends the episode immediately with [`INVALID_LEVEL_REWARD`].

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use anyhow::{Result, anyhow};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{
    Environment, SpaceInfo, SpaceType, StepInfo, StepResult,
    definition::EnvDefinition,
    engine::{EngineVariant, GameEngine, LevelSpec, Winner},
    grid::Grid,
    source::{GeneratedLevel, LevelSource},
};

/// Reward for every step on a level that failed to compile
pub const INVALID_LEVEL_REWARD: f32 = -10.0;

/// Whether the current level loaded and passed its playthrough
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compilation {
    /// Level loaded; steps reach the engine
    Valid,

    /// Level broke; steps short-circuit until the next reset
    Invalid,
}

/// Terminal reward shaping
///
/// `steps` is the number of steps taken before the current one.
pub fn shaped_reward(done: bool, winner: Winner, steps: usize, play_length: usize) -> f32 {
    if !done {
        return 0.0;
    }
    let progress = steps as f64 / play_length as f64;
    let reward = if winner == Winner::PlayerWins { 1.1 - progress } else { -1.1 + progress };
    reward as f32
}

/// Fixed-shape environment around one game engine episode
pub struct GridGame {
    definition: Arc<dyn EnvDefinition>,
    engine: Box<dyn GameEngine>,
    source: Option<Box<dyn LevelSource>>,
    compilation: Compilation,
    state: Grid,
    steps: usize,
    play_length: usize,
    shape: [usize; 3],
    outcome_reported: bool,
    rng: StdRng,
}

impl GridGame {
    /// Play uniformly random built-in levels
    pub fn new(definition: Arc<dyn EnvDefinition>) -> Result<Self> {
        let engine = definition.make_engine(EngineVariant::Primary)?;
        let play_length = definition.play_length();
        if play_length == 0 {
            return Err(anyhow!("play_length must be positive"));
        }
        let shape = definition.state_shape();

        Ok(Self {
            definition,
            engine,
            source: None,
            compilation: Compilation::Valid,
            state: Grid::zeros(shape[0], shape[1], shape[2]),
            steps: 0,
            play_length,
            shape,
            outcome_reported: false,
            rng: StdRng::from_entropy(),
        })
    }

    /// Play levels handed out by `source`
    pub fn with_source(
        definition: Arc<dyn EnvDefinition>,
        source: Box<dyn LevelSource>,
    ) -> Result<Self> {
        let mut game = Self::new(definition)?;
        game.source = Some(source);
        Ok(game)
    }

    /// Reseed level selection
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        if let Some(source) = self.source.as_mut() {
            source.seed(seed);
        }
    }

    /// Compilation state of the current level
    pub fn compilation(&self) -> Compilation {
        self.compilation
    }

    /// Whether the current level compiled
    pub fn compiles(&self) -> bool {
        self.compilation == Compilation::Valid
    }

    /// Steps taken in the current episode
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Last observation
    pub fn state(&self) -> &Grid {
        &self.state
    }

    /// Pad a raw sprite grid and append the background channel
    pub fn observe(&self, raw: &Grid) -> Grid {
        raw.pad_to(self.shape[1], self.shape[2]).with_background()
    }

    fn set_builtin_level(&mut self) -> Result<Grid> {
        let index = self.rng.gen_range(0..self.engine.builtin_levels());
        self.engine.load_level(&LevelSpec::BuiltIn(index))?;
        self.engine.reset()?;
        let raw = self.engine.step(0)?.grid;
        self.compilation = Compilation::Valid;
        Ok(self.observe(&raw))
    }

    fn set_level(&mut self) -> Result<Grid> {
        let next = match self.source.as_mut() {
            Some(source) => source.new_level(),
            None => return self.set_builtin_level(),
        };
        let level = match next {
            Ok(level) => level,
            Err(e) => {
                tracing::debug!("level source failed: {:#}", e);
                self.invalidate();
                return Ok(self.blank());
            }
        };

        let engine = &mut self.engine;
        let playthrough = catch_unwind(AssertUnwindSafe(|| -> Result<Grid> {
            engine.load_level(&LevelSpec::Ascii(level.ascii.clone()))?;
            engine.reset()?;
            Ok(engine.step(0)?.grid)
        }));

        match playthrough {
            Ok(Ok(raw)) if raw.height() > self.shape[1] || raw.width() > self.shape[2] => {
                tracing::debug!(
                    level = ?level.id,
                    "level is {}x{}, larger than the {}x{} observation",
                    raw.height(),
                    raw.width(),
                    self.shape[1],
                    self.shape[2]
                );
                self.invalidate();
                Ok(self.encoded_state(level).unwrap_or_else(|| self.blank()))
            }
            Ok(Ok(raw)) => {
                self.compilation = Compilation::Valid;
                let observed = self.observe(&raw);
                Ok(self.encoded_state(level).unwrap_or(observed))
            }
            Ok(Err(e)) => {
                tracing::debug!(level = ?level.id, "level failed to compile: {:#}", e);
                self.invalidate();
                Ok(self.encoded_state(level).unwrap_or_else(|| self.blank()))
            }
            Err(_) => {
                tracing::warn!(level = ?level.id, "engine aborted while loading level");
                self.invalidate();
                Ok(self.encoded_state(level).unwrap_or_else(|| self.blank()))
            }
        }
    }

    fn encoded_state(&self, level: GeneratedLevel) -> Option<Grid> {
        level.state.filter(|state| state.shape() == self.shape)
    }

    fn blank(&self) -> Grid {
        Grid::zeros(self.shape[0], self.shape[1], self.shape[2])
    }

    fn invalidate(&mut self) {
        self.compilation = Compilation::Invalid;
        self.restart();
    }

    /// Replace the engine handle with a neutral fallback one
    fn restart(&mut self) {
        match self.definition.make_engine(EngineVariant::Fallback) {
            Ok(engine) => self.engine = engine,
            Err(e) => tracing::error!("failed to recreate {} engine: {:#}", self.definition.name(), e),
        }
    }

    fn report_outcome(&mut self, reward: f32) -> Result<()> {
        if self.outcome_reported {
            return Ok(());
        }
        self.outcome_reported = true;
        match self.source.as_mut() {
            Some(source) => source.record_outcome(reward),
            None => Ok(()),
        }
    }
}

impl Environment for GridGame {
    type Observation = Vec<f32>;
    type Action = i64;

    fn reset(&mut self) -> Result<Self::Observation> {
        self.steps = 0;
        self.outcome_reported = false;
        self.state = self.set_level()?;
        Ok(self.state.as_slice().to_vec())
    }

    fn step(&mut self, action: Self::Action) -> Result<StepResult<Self::Observation>> {
        if self.compilation == Compilation::Invalid {
            self.report_outcome(INVALID_LEVEL_REWARD)?;
            return Ok(StepResult {
                observation: self.state.as_slice().to_vec(),
                reward: INVALID_LEVEL_REWARD,
                terminated: true,
                truncated: false,
                info: StepInfo { invalid_level: true, ..StepInfo::default() },
            });
        }

        let out = self.engine.step(action)?;
        let timed_out = self.steps >= self.play_length;
        let done = out.done || timed_out;
        let reward = shaped_reward(done, out.winner, self.steps, self.play_length);

        self.state = self.observe(&out.grid);
        self.steps += 1;
        if done {
            self.report_outcome(reward)?;
        }

        Ok(StepResult {
            observation: self.state.as_slice().to_vec(),
            reward,
            terminated: out.done,
            truncated: timed_out && !out.done,
            info: StepInfo { winner: Some(out.winner), ..StepInfo::default() },
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: self.shape.to_vec(), dtype: SpaceType::Continuous }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(self.engine.num_actions()) }
    }
}
