//! Vectorized environments for parallel rollout collection
//!
//! A [`VecEnv`] steps N environments in lock-step and returns batched
//! results. Finished environments are reset automatically; the observation
//! that ended the episode is kept in [`StepInfo::terminal_observation`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use levelforge::env::{MazeDefinition, vec::{VecEnvConfig, make_vec_envs}};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = VecEnvConfig { num_processes: 4, ..VecEnvConfig::default() };
//! let mut envs = make_vec_envs(Arc::new(MazeDefinition::default()), None, &config)?;
//!
//! let observations = envs.reset()?;
//! let results = envs.step(&[0, 1, 2, 3])?;
//! assert_eq!(results.rewards.len(), 4);
//! envs.close()?;
//! # Ok(())
//! # }
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;

use super::{
    Environment, SpaceInfo, StepInfo, StepResult,
    definition::EnvDefinition,
    game::GridGame,
    monitor::Monitor,
    source::LevelSource,
};

pub mod frame_stack;
pub mod in_process;
pub mod normalize;
pub mod workers;

pub use frame_stack::FrameStack;
pub use in_process::InProcessVecEnv;
pub use normalize::VecNormalize;
pub use workers::WorkerVecEnv;

/// Deferred environment constructor, run where the environment will live
pub type EnvFactory<E> = Box<dyn FnOnce() -> Result<E> + Send>;

/// Builds the level source for environment `rank`
pub type SourceFactory = Arc<dyn Fn(usize) -> Result<Box<dyn LevelSource>> + Send + Sync>;

/// Batched environment interface
pub trait VecEnv: Send {
    /// Number of environments
    fn num_envs(&self) -> usize;

    /// Observation space of a single environment
    fn observation_space(&self) -> SpaceInfo;

    /// Action space of a single environment
    fn action_space(&self) -> SpaceInfo;

    /// Reset every environment
    fn reset(&mut self) -> Result<Vec<Vec<f32>>>;

    /// Step every environment with one action each
    fn step(&mut self, actions: &[i64]) -> Result<VecStepResult>;

    /// Release the environments
    fn close(&mut self) -> Result<()>;
}

/// Result of stepping a vectorized environment
///
/// Contains observations, rewards, and done flags for all environments.
#[derive(Debug, Clone, Default)]
pub struct VecStepResult {
    /// Observations for each environment
    pub observations: Vec<Vec<f32>>,

    /// Rewards for each environment
    pub rewards: Vec<f32>,

    /// Termination flags for each environment
    pub terminated: Vec<bool>,

    /// Truncation flags for each environment
    pub truncated: Vec<bool>,

    /// Step info for each environment
    pub infos: Vec<StepInfo>,
}

impl VecStepResult {
    /// Unpack individual step results into parallel vectors
    pub fn from_results(results: Vec<StepResult<Vec<f32>>>) -> Self {
        let mut batch = Self {
            observations: Vec::with_capacity(results.len()),
            rewards: Vec::with_capacity(results.len()),
            terminated: Vec::with_capacity(results.len()),
            truncated: Vec::with_capacity(results.len()),
            infos: Vec::with_capacity(results.len()),
        };
        for result in results {
            batch.observations.push(result.observation);
            batch.rewards.push(result.reward);
            batch.terminated.push(result.terminated);
            batch.truncated.push(result.truncated);
            batch.infos.push(result.info);
        }
        batch
    }

    /// Per-environment episode end flags
    pub fn dones(&self) -> Vec<bool> {
        self.terminated.iter().zip(&self.truncated).map(|(&t, &u)| t || u).collect()
    }
}

/// Step `env`, resetting it when the episode ends
pub(crate) fn step_auto_reset<E>(env: &mut E, action: i64) -> Result<StepResult<Vec<f32>>>
where
    E: Environment<Observation = Vec<f32>, Action = i64>,
{
    let mut result = env.step(action)?;
    if result.done() {
        let first = env.reset()?;
        let terminal = std::mem::replace(&mut result.observation, first);
        result.info.terminal_observation = Some(terminal);
    }
    Ok(result)
}

/// Options for [`make_vec_envs`]
#[derive(Debug, Clone)]
pub struct VecEnvConfig {
    /// Number of environments
    pub num_processes: usize,

    /// Base seed, environment `rank` is seeded with `seed + rank`
    pub seed: u64,

    /// Discount for reward normalization of flat observation spaces
    pub gamma: Option<f64>,

    /// Directory for per-rank monitor logs
    pub log_dir: Option<PathBuf>,

    /// Allow resets before an episode ends
    pub allow_early_resets: bool,

    /// Stack this many frames along the channel axis
    pub num_frame_stack: Option<usize>,
}

impl Default for VecEnvConfig {
    fn default() -> Self {
        Self {
            num_processes: 1,
            seed: 0,
            gamma: None,
            log_dir: None,
            allow_early_resets: true,
            num_frame_stack: None,
        }
    }
}

/// Factory for one monitored grid game
pub fn make_env(
    definition: Arc<dyn EnvDefinition>,
    sources: Option<SourceFactory>,
    seed: u64,
    rank: usize,
    log_dir: Option<PathBuf>,
    allow_early_resets: bool,
) -> EnvFactory<Monitor<GridGame>> {
    Box::new(move || {
        let mut game = match sources {
            Some(sources) => GridGame::with_source(definition, sources(rank)?)?,
            None => GridGame::new(definition)?,
        };
        game.seed(seed + rank as u64);
        Monitor::new(game, log_dir.as_deref(), rank, allow_early_resets)
    })
}

/// Build the vectorized environment stack used for rollouts
///
/// One environment runs in-process; more run on dedicated worker threads.
/// Flat observation spaces are normalized, grids are not. Frame stacking is
/// applied last.
pub fn make_vec_envs(
    definition: Arc<dyn EnvDefinition>,
    sources: Option<SourceFactory>,
    config: &VecEnvConfig,
) -> Result<Box<dyn VecEnv>> {
    let factories: Vec<_> = (0..config.num_processes)
        .map(|rank| {
            make_env(
                definition.clone(),
                sources.clone(),
                config.seed,
                rank,
                config.log_dir.clone(),
                config.allow_early_resets,
            )
        })
        .collect();

    let mut envs: Box<dyn VecEnv> = if factories.len() > 1 {
        Box::new(WorkerVecEnv::new(factories)?)
    } else {
        Box::new(InProcessVecEnv::new(factories)?)
    };

    if envs.observation_space().shape.len() == 1 {
        envs = Box::new(VecNormalize::new(envs, config.gamma));
    }

    if let Some(nstack) = config.num_frame_stack {
        envs = Box::new(FrameStack::new(envs, nstack)?);
    }

    tracing::debug!(
        num_envs = envs.num_envs(),
        shape = ?envs.observation_space().shape,
        "created vectorized {} environments",
        definition.name()
    );
    Ok(envs)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::definition::MazeDefinition;

    #[test]
    fn test_make_vec_envs_single_process() {
        let config = VecEnvConfig::default();
        let mut envs = make_vec_envs(Arc::new(MazeDefinition::default()), None, &config).unwrap();
        assert_eq!(envs.num_envs(), 1);
        assert_eq!(envs.observation_space().shape, vec![5, 7, 11]);

        let obs = envs.reset().unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].len(), 5 * 7 * 11);
        let result = envs.step(&[0]).unwrap();
        assert_eq!(result.rewards.len(), 1);
        envs.close().unwrap();
    }

    #[test]
    fn test_make_vec_envs_workers_with_frame_stack() {
        let config =
            VecEnvConfig { num_processes: 3, num_frame_stack: Some(2), ..VecEnvConfig::default() };
        let mut envs = make_vec_envs(Arc::new(MazeDefinition::default()), None, &config).unwrap();
        assert_eq!(envs.num_envs(), 3);
        assert_eq!(envs.observation_space().shape, vec![10, 7, 11]);

        let obs = envs.reset().unwrap();
        assert!(obs.iter().all(|o| o.len() == 10 * 7 * 11));
        for _ in 0..5 {
            let result = envs.step(&[1, 2, 3]).unwrap();
            assert_eq!(result.observations.len(), 3);
        }
        envs.close().unwrap();
    }

    #[test]
    fn test_episode_stats_reach_the_batch() {
        let definition = Arc::new(MazeDefinition::new(crate::env::definition::MazeConfig {
            play_length: 2,
            ..Default::default()
        }));
        let mut envs = make_vec_envs(definition, None, &VecEnvConfig::default()).unwrap();
        envs.reset().unwrap();

        let mut finished = 0;
        for _ in 0..3 {
            let result = envs.step(&[0]).unwrap();
            finished += result.infos.iter().filter(|i| i.episode.is_some()).count();
        }
        assert_eq!(finished, 1, "noop episodes time out after play_length + 1 steps");
    }
}
