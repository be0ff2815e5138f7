//! Training statistics for PPO updates

use std::ops::AddAssign;

/// Statistics of one or more PPO gradient steps
#[derive(Debug, Clone, Default)]
pub struct TrainingStats {
    /// Policy loss
    pub policy_loss: f64,

    /// Value function loss
    pub value_loss: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// Fraction of clipped policy updates
    pub clip_fraction: f64,

    /// Approximate KL divergence between old and new policies
    pub approx_kl: f64,

    /// Explained variance of value function predictions
    pub explained_var: f64,

    /// Number of gradient updates performed
    pub num_updates: usize,
}

impl TrainingStats {
    /// Create statistics for a single gradient step
    pub fn new(
        policy_loss: f64,
        value_loss: f64,
        entropy: f64,
        clip_fraction: f64,
        approx_kl: f64,
        explained_var: f64,
    ) -> Self {
        Self { policy_loss, value_loss, entropy, clip_fraction, approx_kl, explained_var, num_updates: 1 }
    }

    /// Average over accumulated gradient steps
    pub fn average(&self) -> Self {
        if self.num_updates == 0 {
            return Self::default();
        }
        let scale = self.num_updates as f64;
        Self {
            policy_loss: self.policy_loss / scale,
            value_loss: self.value_loss / scale,
            entropy: self.entropy / scale,
            clip_fraction: self.clip_fraction / scale,
            approx_kl: self.approx_kl / scale,
            explained_var: self.explained_var / scale,
            num_updates: self.num_updates,
        }
    }
}

impl AddAssign<&TrainingStats> for TrainingStats {
    fn add_assign(&mut self, other: &TrainingStats) {
        self.policy_loss += other.policy_loss;
        self.value_loss += other.value_loss;
        self.entropy += other.entropy;
        self.clip_fraction += other.clip_fraction;
        self.approx_kl += other.approx_kl;
        self.explained_var += other.explained_var;
        self.num_updates += other.num_updates;
    }
}
