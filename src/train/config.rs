//! Co-training configuration
//!
//! Controls the alternation between agent bursts and generator updates, where
//! checkpoints go and how the scratch level pool is refreshed. Loadable from
//! JSON; the device is chosen at runtime and never serialized.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tch::Device;

/// Co-training parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Root of `agents/`, `models/`, `levels.csv` and `losses.csv`
    pub save_dir: PathBuf,

    /// Generator learning rate
    pub learning_rate: f64,

    /// Generator updates stop early once the loss drops below this
    pub loss_threshold: f64,

    /// Maximum generator gradient steps per iteration
    pub generator_steps: usize,

    /// Checkpoint every this many iterations
    pub save_frequency: usize,

    /// Cold-start agent budget, in multiples of the per-iteration RL steps
    pub pretrain_multiplier: usize,

    /// Agent budget per iteration, in multiples of the RL steps
    pub burst_multiplier: usize,

    /// Value the generator pushes the critic's estimate towards
    pub target_value: f64,

    /// Version to resume from, 0 starts fresh
    pub resume_version: usize,

    /// Size of the scratch level pool refreshed each iteration
    ///
    /// When absent the agent keeps playing the game's built-in levels.
    pub pool_size: Option<usize>,

    /// Number of top-ranked pool levels kept on refresh, all when absent
    pub elite_keep: Option<usize>,

    /// Device for latent samples; must hold the generator's parameters
    #[serde(skip, default = "Device::cuda_if_available")]
    pub device: Device,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("runs"),
            learning_rate: 1e-4,
            loss_threshold: 0.1,
            generator_steps: 1,
            save_frequency: 1,
            pretrain_multiplier: 3000,
            burst_multiplier: 4,
            target_value: 1.0,
            resume_version: 0,
            pool_size: None,
            elite_keep: None,
            device: Device::cuda_if_available(),
        }
    }
}

impl TrainerConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if self.loss_threshold < 0.0 {
            return Err(anyhow!("loss_threshold must be non-negative"));
        }
        if self.generator_steps == 0 {
            return Err(anyhow!("generator_steps must be positive"));
        }
        if self.save_frequency == 0 {
            return Err(anyhow!("save_frequency must be positive"));
        }
        if !self.target_value.is_finite() {
            return Err(anyhow!("target_value must be finite"));
        }
        if self.pool_size == Some(0) {
            return Err(anyhow!("pool_size must be positive when set"));
        }
        if self.save_dir.as_os_str().is_empty() {
            return Err(anyhow!("save_dir must not be empty"));
        }
        Ok(())
    }

    /// Builder: set save directory
    pub fn save_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.save_dir = dir.into();
        self
    }

    /// Builder: set generator learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Builder: set early-stop loss threshold
    pub fn loss_threshold(mut self, threshold: f64) -> Self {
        self.loss_threshold = threshold;
        self
    }

    /// Builder: set generator gradient steps per iteration
    pub fn generator_steps(mut self, steps: usize) -> Self {
        self.generator_steps = steps;
        self
    }

    /// Builder: set checkpoint frequency
    pub fn save_frequency(mut self, frequency: usize) -> Self {
        self.save_frequency = frequency;
        self
    }

    /// Builder: set cold-start and per-iteration agent budget multipliers
    pub fn budgets(mut self, pretrain_multiplier: usize, burst_multiplier: usize) -> Self {
        self.pretrain_multiplier = pretrain_multiplier;
        self.burst_multiplier = burst_multiplier;
        self
    }

    /// Builder: set the critic target
    pub fn target_value(mut self, target: f64) -> Self {
        self.target_value = target;
        self
    }

    /// Builder: resume from a checkpointed version
    pub fn resume_version(mut self, version: usize) -> Self {
        self.resume_version = version;
        self
    }

    /// Builder: refresh a scratch pool of `size` levels each iteration
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Builder: keep only the `keep` best pool levels on refresh
    pub fn elite_keep(mut self, keep: usize) -> Self {
        self.elite_keep = Some(keep);
        self
    }

    /// Builder: set device
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}
