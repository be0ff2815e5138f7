//! PPO agent configuration and hyperparameters
//!
//! Defaults follow common settings for small grid games. The struct can be
//! loaded from JSON; missing fields take their default values.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// PPO agent configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Learning rate for policy and value function
    pub learning_rate: f64,

    /// Number of training epochs per rollout
    pub n_epochs: usize,

    /// Minibatch size for training
    pub batch_size: usize,

    /// Steps collected per environment before each update
    pub num_steps: usize,

    /// Number of parallel environments
    pub num_processes: usize,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// PPO clipping parameter (epsilon)
    pub clip_range: f64,

    /// Value function clipping parameter, unclipped when absent
    pub clip_range_vf: Option<f64>,

    /// Value function loss coefficient
    pub vf_coef: f64,

    /// Entropy bonus coefficient
    pub ent_coef: f64,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Target KL divergence for early stopping
    pub target_kl: Option<f64>,

    /// Width of the shared feature layer
    pub hidden_dim: i64,

    /// Channels of each convolution
    pub conv_channels: i64,

    /// Seed for environments and minibatch shuffling
    pub seed: u64,

    /// Directory for per-environment monitor logs
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 2.5e-4,
            n_epochs: 4,
            batch_size: 64,
            num_steps: 128,
            num_processes: 1,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.1,
            clip_range_vf: None,
            vf_coef: 0.5,
            ent_coef: 0.01,
            max_grad_norm: 0.5,
            target_kl: None,
            hidden_dim: 64,
            conv_channels: 16,
            seed: 0,
            log_dir: None,
        }
    }
}

impl AgentConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment steps consumed by one update
    pub fn steps_per_update(&self) -> usize {
        self.num_steps * self.num_processes
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if self.n_epochs == 0 {
            return Err(anyhow!("n_epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if self.num_steps == 0 {
            return Err(anyhow!("num_steps must be positive"));
        }
        if self.num_processes == 0 {
            return Err(anyhow!("num_processes must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(anyhow!("gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(anyhow!("gae_lambda must be in [0, 1]"));
        }
        if self.clip_range <= 0.0 {
            return Err(anyhow!("clip_range must be positive"));
        }
        if self.clip_range_vf.is_some_and(|clip| clip <= 0.0) {
            return Err(anyhow!("clip_range_vf must be positive"));
        }
        if self.vf_coef < 0.0 {
            return Err(anyhow!("vf_coef must be non-negative"));
        }
        if self.ent_coef < 0.0 {
            return Err(anyhow!("ent_coef must be non-negative"));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(anyhow!("max_grad_norm must be positive"));
        }
        if self.target_kl.is_some_and(|kl| kl < 0.0) {
            return Err(anyhow!("target_kl must be non-negative"));
        }
        if self.hidden_dim <= 0 || self.conv_channels <= 0 {
            return Err(anyhow!("network widths must be positive"));
        }
        Ok(())
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set number of training epochs
    pub fn n_epochs(mut self, epochs: usize) -> Self {
        self.n_epochs = epochs;
        self
    }

    /// Set minibatch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set rollout length per environment
    pub fn num_steps(mut self, steps: usize) -> Self {
        self.num_steps = steps;
        self
    }

    /// Set number of parallel environments
    pub fn num_processes(mut self, n: usize) -> Self {
        self.num_processes = n;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set PPO clipping parameter
    pub fn clip_range(mut self, clip: f64) -> Self {
        self.clip_range = clip;
        self
    }

    /// Set entropy bonus coefficient
    pub fn ent_coef(mut self, coef: f64) -> Self {
        self.ent_coef = coef;
        self
    }

    /// Set network widths
    pub fn network(mut self, conv_channels: i64, hidden_dim: i64) -> Self {
        self.conv_channels = conv_channels;
        self.hidden_dim = hidden_dim;
        self
    }

    /// Set seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set monitor log directory
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.steps_per_update(), 128);
    }

    #[test]
    fn test_config_validation() {
        assert!(AgentConfig::new().learning_rate(-1.0).validate().is_err());
        assert!(AgentConfig::new().gamma(1.5).validate().is_err());
        assert!(AgentConfig::new().n_epochs(0).validate().is_err());
        assert!(AgentConfig::new().num_processes(0).validate().is_err());
        assert!(AgentConfig::new().network(0, 64).validate().is_err());

        let mut config = AgentConfig::new();
        config.clip_range_vf = Some(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"num_processes": 4, "num_steps": 32}"#).unwrap();
        assert_eq!(config.num_processes, 4);
        assert_eq!(config.steps_per_update(), 128);
        assert_eq!(config.gamma, 0.99);
    }
}
