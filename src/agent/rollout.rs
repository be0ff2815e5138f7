//! Rollout storage and Generalized Advantage Estimation
//!
//! Transitions are stored in a `[num_steps, num_envs]` layout. Observations
//! are kept flat per environment.
//!
//! ```text
//! δ_t = r_t + γ * V_{t+1} * (1 - done_t) - V_t
//! A_t = δ_t + γ * λ * (1 - done_t) * A_{t+1}
//! ```

use anyhow::{Result, ensure};
use tch::{Device, Kind, Tensor};

/// Fixed-size buffer for one PPO rollout
#[derive(Debug)]
pub struct RolloutBuffer {
    num_steps: usize,
    num_envs: usize,
    obs_dim: usize,
    observations: Vec<f32>,
    actions: Vec<Vec<i64>>,
    rewards: Vec<Vec<f32>>,
    values: Vec<Vec<f32>>,
    log_probs: Vec<Vec<f32>>,
    dones: Vec<Vec<bool>>,
    advantages: Vec<Vec<f32>>,
    returns: Vec<Vec<f32>>,
    pos: usize,
}

/// Flattened rollout ready for minibatch training, `[num_steps * num_envs]` rows
#[derive(Debug)]
pub struct RolloutBatch {
    /// Observations `[n, obs_dim]`
    pub observations: Tensor,

    /// Actions `[n]`
    pub actions: Tensor,

    /// Log probabilities at collection time `[n]`
    pub log_probs: Tensor,

    /// Value estimates at collection time `[n]`
    pub values: Tensor,

    /// Advantages `[n]`
    pub advantages: Tensor,

    /// Returns `[n]`
    pub returns: Tensor,
}

impl RolloutBuffer {
    /// Create a buffer for `num_steps` steps of `num_envs` environments
    pub fn new(num_steps: usize, num_envs: usize, obs_dim: usize) -> Self {
        Self {
            num_steps,
            num_envs,
            obs_dim,
            observations: vec![0.0; num_steps * num_envs * obs_dim],
            actions: vec![vec![0; num_envs]; num_steps],
            rewards: vec![vec![0.0; num_envs]; num_steps],
            values: vec![vec![0.0; num_envs]; num_steps],
            log_probs: vec![vec![0.0; num_envs]; num_steps],
            dones: vec![vec![false; num_envs]; num_steps],
            advantages: vec![vec![0.0; num_envs]; num_steps],
            returns: vec![vec![0.0; num_envs]; num_steps],
            pos: 0,
        }
    }

    /// Store one batched step
    ///
    /// `dones` marks transitions that ended an episode, terminated or truncated.
    pub fn push(
        &mut self,
        observations: &[Vec<f32>],
        actions: &[i64],
        rewards: &[f32],
        values: &[f32],
        log_probs: &[f32],
        dones: &[bool],
    ) -> Result<()> {
        ensure!(self.pos < self.num_steps, "rollout buffer is full");
        ensure!(
            observations.len() == self.num_envs && actions.len() == self.num_envs,
            "expected {} environments per step",
            self.num_envs
        );

        let start = self.pos * self.num_envs * self.obs_dim;
        for (env, obs) in observations.iter().enumerate() {
            ensure!(obs.len() == self.obs_dim, "observation has {} values, expected {}", obs.len(), self.obs_dim);
            let offset = start + env * self.obs_dim;
            self.observations[offset..offset + self.obs_dim].copy_from_slice(obs);
        }
        self.actions[self.pos].copy_from_slice(actions);
        self.rewards[self.pos].copy_from_slice(rewards);
        self.values[self.pos].copy_from_slice(values);
        self.log_probs[self.pos].copy_from_slice(log_probs);
        self.dones[self.pos].copy_from_slice(dones);
        self.pos += 1;
        Ok(())
    }

    /// Whether every step slot is filled
    pub fn is_full(&self) -> bool {
        self.pos == self.num_steps
    }

    /// Forget stored transitions
    pub fn clear(&mut self) {
        self.pos = 0;
    }

    /// Advantages `[num_steps][num_envs]`
    pub fn advantages(&self) -> &[Vec<f32>] {
        &self.advantages
    }

    /// Returns `[num_steps][num_envs]`
    pub fn returns(&self) -> &[Vec<f32>] {
        &self.returns
    }

    /// Compute GAE advantages and returns
    ///
    /// `last_values` are the value estimates of the observations following
    /// the final stored step.
    pub fn compute_advantages(&mut self, last_values: &[f32], gamma: f32, gae_lambda: f32) {
        debug_assert_eq!(last_values.len(), self.num_envs, "last_values length mismatch");
        let steps = self.pos;
        for env in 0..self.num_envs {
            let mut gae = 0.0;
            for t in (0..steps).rev() {
                let next_value =
                    if t + 1 == steps { last_values[env] } else { self.values[t + 1][env] };
                let non_terminal = if self.dones[t][env] { 0.0 } else { 1.0 };
                let delta =
                    self.rewards[t][env] + gamma * next_value * non_terminal - self.values[t][env];
                gae = delta + gamma * gae_lambda * non_terminal * gae;
                self.advantages[t][env] = gae;
                self.returns[t][env] = gae + self.values[t][env];
            }
        }
    }

    /// Flatten the stored steps into tensors on `device`
    pub fn batch(&self, device: Device) -> RolloutBatch {
        let n = (self.pos * self.num_envs) as i64;
        let flat_f32 = |rows: &[Vec<f32>]| -> Tensor {
            let values: Vec<f32> = rows[..self.pos].iter().flatten().copied().collect();
            Tensor::from_slice(&values).to_device(device)
        };
        let actions: Vec<i64> = self.actions[..self.pos].iter().flatten().copied().collect();
        let observations = &self.observations[..self.pos * self.num_envs * self.obs_dim];

        RolloutBatch {
            observations: Tensor::from_slice(observations)
                .view([n, self.obs_dim as i64])
                .to_device(device),
            actions: Tensor::from_slice(&actions).to_kind(Kind::Int64).to_device(device),
            log_probs: flat_f32(&self.log_probs),
            values: flat_f32(&self.values),
            advantages: flat_f32(&self.advantages),
            returns: flat_f32(&self.returns),
        }
    }
}
