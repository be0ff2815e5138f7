//! Loss computation functions for PPO
//!
//! Policy loss, value loss, and entropy loss, plus minibatch sampling.

use rand::{Rng, seq::SliceRandom};
use tch::{Kind, Tensor};

/// Compute PPO policy loss with clipping
///
/// Returns (policy_loss, clip_fraction, approx_kl)
///
/// # Arguments
/// * `log_probs` - Log probabilities of actions under current policy
/// * `old_log_probs` - Log probabilities of actions under old policy
/// * `advantages` - Computed advantages
/// * `clip_range` - PPO clipping parameter (epsilon)
pub fn compute_policy_loss(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_range: f64,
) -> (Tensor, f64, f64) {
    let ratio = (log_probs - old_log_probs).exp();

    let clipped_ratio = ratio.clamp(1.0 - clip_range, 1.0 + clip_range);
    let policy_loss_1 = advantages * &ratio;
    let policy_loss_2 = advantages * clipped_ratio;
    let policy_loss = -policy_loss_1.minimum(&policy_loss_2).mean(Kind::Float);

    let clip_fraction = tch::no_grad(|| {
        (&ratio - 1.0).abs().gt(clip_range).to_kind(Kind::Float).mean(Kind::Float).double_value(&[])
    });
    let approx_kl =
        tch::no_grad(|| (old_log_probs - log_probs).mean(Kind::Float).double_value(&[]));

    (policy_loss, clip_fraction, approx_kl)
}

/// Compute value function loss with optional clipping
///
/// Returns (value_loss, explained_variance)
///
/// # Arguments
/// * `values` - Predicted values under current value function
/// * `old_values` - Predicted values at collection time
/// * `returns` - Computed returns (targets)
/// * `clip_range_vf` - Value function clipping parameter
pub fn compute_value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_range_vf: Option<f64>,
) -> (Tensor, f64) {
    let value_loss = match clip_range_vf {
        Some(clip) => {
            let values_clipped = old_values + (values - old_values).clamp(-clip, clip);
            let vf_loss_1 = (values - returns).square();
            let vf_loss_2 = (values_clipped - returns).square();
            vf_loss_1.maximum(&vf_loss_2).mean(Kind::Float)
        }
        None => (values - returns).square().mean(Kind::Float),
    };

    let explained_var = tch::no_grad(|| {
        let var_returns = returns.var(false).double_value(&[]);
        if var_returns == 0.0 {
            1.0
        } else {
            1.0 - (returns - values).var(false).double_value(&[]) / var_returns
        }
    });

    (value_loss, explained_var)
}

/// Compute entropy loss (negative entropy for maximization)
pub fn compute_entropy_loss(entropy: &Tensor) -> Tensor {
    -entropy.mean(Kind::Float)
}

/// Generate shuffled minibatch indices
///
/// Each minibatch holds `batch_size` indices except possibly the last.
pub fn generate_minibatch_indices<R: Rng>(
    buffer_size: usize,
    batch_size: usize,
    rng: &mut R,
) -> Vec<Vec<i64>> {
    let mut indices: Vec<i64> = (0..buffer_size as i64).collect();
    indices.shuffle(rng);
    indices.chunks(batch_size).map(|chunk| chunk.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};
    use tch::Device;

    #[test]
    fn test_policy_loss_unclipped_at_ratio_one() {
        let log_probs = Tensor::from_slice(&[-1.0f32, -0.5]);
        let advantages = Tensor::from_slice(&[1.0f32, 3.0]);
        let (loss, clip_fraction, approx_kl) =
            compute_policy_loss(&log_probs, &log_probs, &advantages, 0.2);
        assert!((loss.double_value(&[]) + 2.0).abs() < 1e-6);
        assert_eq!(clip_fraction, 0.0);
        assert!(approx_kl.abs() < 1e-9);
    }

    #[test]
    fn test_policy_loss_clips_large_ratios() {
        let old = Tensor::from_slice(&[0.0f32]);
        let new = Tensor::from_slice(&[1.0f32]);
        let advantages = Tensor::from_slice(&[1.0f32]);
        let (loss, clip_fraction, _) = compute_policy_loss(&new, &old, &advantages, 0.2);
        assert!((loss.double_value(&[]) + 1.2).abs() < 1e-6);
        assert_eq!(clip_fraction, 1.0);
    }

    #[test]
    fn test_value_loss() {
        let values = Tensor::from_slice(&[1.0f32, 2.0]);
        let returns = Tensor::from_slice(&[0.0f32, 2.0]);
        let (loss, _) = compute_value_loss(&values, &values, &returns, None);
        assert!((loss.double_value(&[]) - 0.5).abs() < 1e-6);

        let (perfect_loss, explained) = compute_value_loss(&returns, &returns, &returns, Some(0.2));
        assert_eq!(perfect_loss.double_value(&[]), 0.0);
        assert!((explained - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_minibatch_indices_cover_buffer() {
        let mut rng = StdRng::seed_from_u64(0);
        let batches = generate_minibatch_indices(10, 4, &mut rng);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        let mut all: Vec<i64> = batches.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_entropy_loss_sign() {
        let entropy = Tensor::ones([3], (Kind::Float, Device::Cpu));
        assert_eq!(compute_entropy_loss(&entropy).double_value(&[]), -1.0);
    }
}
