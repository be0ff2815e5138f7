//! Reinforcement learning agents
//!
//! The co-training loop talks to its agent only through [`Agent`], and scores
//! generated levels through the agent's [`ActorCritic`] value head. The
//! reference implementation is [`PpoAgent`], a PPO learner over a
//! convolutional actor-critic.

use std::path::Path;

use anyhow::Result;
use tch::Tensor;

pub mod config;
pub mod loss;
pub mod network;
pub mod ppo;
pub mod rollout;
pub mod stats;

pub use config::AgentConfig;
pub use network::GridActorCritic;
pub use ppo::PpoAgent;
pub use stats::TrainingStats;

/// Policy network exposing its value head
pub trait ActorCritic {
    /// Value estimate `[batch, 1]` for `state`
    ///
    /// `rnn_hxs` is the recurrent state `[batch, recurrent_hidden_state_size]`
    /// and `masks` is `[batch, 1]`, zero where an episode just started.
    fn get_value(&self, state: &Tensor, rnn_hxs: &Tensor, masks: &Tensor) -> Tensor;

    /// Width of the recurrent state
    fn recurrent_hidden_state_size(&self) -> i64;
}

/// Learner that plays levels and improves its policy
pub trait Agent {
    /// Restore the policy saved for `version` under `dir`
    fn load(&mut self, dir: &Path, version: usize) -> Result<()>;

    /// Save the policy under `dir`, tagged with `version`
    fn save(&self, dir: &Path, version: usize) -> Result<()>;

    /// Rebuild the training environments
    ///
    /// With a pool directory the environments replay that pool's playable
    /// levels; without one they play the game's built-in levels.
    fn set_envs(&mut self, pool: Option<&Path>) -> Result<()>;

    /// Train for roughly `step_budget` environment steps
    fn train_agent(&mut self, step_budget: usize) -> Result<()>;

    /// Play each ascii level once and return the final episode rewards
    fn play(&mut self, levels: &[String]) -> Result<Vec<f32>>;

    /// Shut down the training environments
    fn close_envs(&mut self) -> Result<()>;

    /// Policy network used as the generator's critic
    fn actor_critic(&self) -> &dyn ActorCritic;
}
