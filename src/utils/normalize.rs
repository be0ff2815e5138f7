//! Running mean and variance for observation and reward whitening
//!
//! Statistics are merged batch by batch with the parallel-axis update, which
//! stays numerically stable over long runs.

/// Running mean and variance of fixed-size vectors
#[derive(Debug, Clone)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    var: Vec<f64>,
    count: f64,
}

impl RunningMeanStd {
    /// Create statistics for vectors of length `size`
    pub fn new(size: usize) -> Self {
        Self { mean: vec![0.0; size], var: vec![1.0; size], count: 1e-4 }
    }

    /// Merge a batch of samples `[batch][size]`
    pub fn update(&mut self, batch: &[Vec<f32>]) {
        if batch.is_empty() {
            return;
        }
        let n = batch.len() as f64;
        let dim = self.mean.len();

        let mut batch_mean = vec![0.0; dim];
        for sample in batch {
            for (acc, &x) in batch_mean.iter_mut().zip(sample) {
                *acc += x as f64;
            }
        }
        batch_mean.iter_mut().for_each(|m| *m /= n);

        let mut batch_var = vec![0.0; dim];
        for sample in batch {
            for ((acc, &x), m) in batch_var.iter_mut().zip(sample).zip(&batch_mean) {
                let d = x as f64 - m;
                *acc += d * d;
            }
        }
        batch_var.iter_mut().for_each(|v| *v /= n);

        self.merge(&batch_mean, &batch_var, n);
    }

    /// Merge a batch of scalar samples (size-1 statistics)
    pub fn update_scalars(&mut self, batch: &[f64]) {
        if batch.is_empty() {
            return;
        }
        let n = batch.len() as f64;
        let mean = batch.iter().sum::<f64>() / n;
        let var = batch.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        self.merge(&[mean], &[var], n);
    }

    fn merge(&mut self, batch_mean: &[f64], batch_var: &[f64], batch_count: f64) {
        let total = self.count + batch_count;
        for i in 0..self.mean.len() {
            let delta = batch_mean[i] - self.mean[i];
            let m_a = self.var[i] * self.count;
            let m_b = batch_var[i] * batch_count;
            let m2 = m_a + m_b + delta * delta * self.count * batch_count / total;
            self.mean[i] += delta * batch_count / total;
            self.var[i] = m2 / total;
        }
        self.count = total;
    }

    /// Whiten `x` and clip every element to `[-clip, clip]`
    pub fn normalize(&self, x: &[f32], epsilon: f64, clip: f64) -> Vec<f32> {
        x.iter()
            .zip(&self.mean)
            .zip(&self.var)
            .map(|((&v, m), var)| ((v as f64 - m) / (var + epsilon).sqrt()).clamp(-clip, clip) as f32)
            .collect()
    }

    /// Current mean
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Current variance
    pub fn var(&self) -> &[f64] {
        &self.var
    }

    /// Number of samples seen
    pub fn count(&self) -> f64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let mut rms = RunningMeanStd::new(2);
        rms.update(&[vec![1.0, 2.0], vec![2.0, 4.0], vec![3.0, 6.0]]);

        assert!((rms.mean()[0] - 2.0).abs() < 1e-3);
        assert!((rms.mean()[1] - 4.0).abs() < 1e-3);
        assert!((rms.var()[0] - 2.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let mut batched = RunningMeanStd::new(1);
        batched.update(&[vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);

        let mut incremental = RunningMeanStd::new(1);
        for x in 1..=4 {
            incremental.update(&[vec![x as f32]]);
        }

        assert!((batched.mean()[0] - incremental.mean()[0]).abs() < 1e-3);
        assert!((batched.var()[0] - incremental.var()[0]).abs() < 1e-2);
    }

    #[test]
    fn test_normalize_clips() {
        let mut rms = RunningMeanStd::new(1);
        rms.update(&[vec![0.0], vec![0.0], vec![0.0]]);
        let out = rms.normalize(&[100.0], 1e-8, 5.0);
        assert_eq!(out, vec![5.0]);
    }

    #[test]
    fn test_scalar_updates() {
        let mut rms = RunningMeanStd::new(1);
        rms.update_scalars(&[2.0, 4.0]);
        assert!((rms.mean()[0] - 3.0).abs() < 1e-3);
        assert!((rms.var()[0] - 1.0).abs() < 1e-3);
    }
}
