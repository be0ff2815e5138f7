//! Observation and return normalization for flat observation spaces

use anyhow::Result;

use super::{VecEnv, VecStepResult};
use crate::{env::SpaceInfo, utils::normalize::RunningMeanStd};

const CLIP: f64 = 10.0;
const EPSILON: f64 = 1e-8;

/// Whitens observations with running statistics and optionally scales rewards
/// by the running standard deviation of the discounted return
///
/// Reward scaling is enabled only when a discount is given.
pub struct VecNormalize {
    venv: Box<dyn VecEnv>,
    obs_rms: RunningMeanStd,
    ret_rms: Option<RunningMeanStd>,
    returns: Vec<f64>,
    gamma: f64,
    training: bool,
}

impl VecNormalize {
    /// Wrap `venv`, scaling rewards when `gamma` is set
    pub fn new(venv: Box<dyn VecEnv>, gamma: Option<f64>) -> Self {
        let obs_dim = venv.observation_space().flat_len();
        let num_envs = venv.num_envs();
        Self {
            venv,
            obs_rms: RunningMeanStd::new(obs_dim),
            ret_rms: gamma.map(|_| RunningMeanStd::new(1)),
            returns: vec![0.0; num_envs],
            gamma: gamma.unwrap_or(0.99),
            training: true,
        }
    }

    /// Freeze or resume statistics updates
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// Observation statistics
    pub fn obs_rms(&self) -> &RunningMeanStd {
        &self.obs_rms
    }

    fn normalize_obs(&mut self, observations: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
        if self.training {
            self.obs_rms.update(&observations);
        }
        observations.iter().map(|obs| self.obs_rms.normalize(obs, EPSILON, CLIP)).collect()
    }
}

impl VecEnv for VecNormalize {
    fn num_envs(&self) -> usize {
        self.venv.num_envs()
    }

    fn observation_space(&self) -> SpaceInfo {
        self.venv.observation_space()
    }

    fn action_space(&self) -> SpaceInfo {
        self.venv.action_space()
    }

    fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        self.returns.iter_mut().for_each(|r| *r = 0.0);
        let observations = self.venv.reset()?;
        Ok(self.normalize_obs(observations))
    }

    fn step(&mut self, actions: &[i64]) -> Result<VecStepResult> {
        let mut result = self.venv.step(actions)?;
        let dones = result.dones();
        result.observations = self.normalize_obs(std::mem::take(&mut result.observations));

        if let Some(ret_rms) = self.ret_rms.as_mut() {
            for (ret, &reward) in self.returns.iter_mut().zip(&result.rewards) {
                *ret = *ret * self.gamma + reward as f64;
            }
            if self.training {
                ret_rms.update_scalars(&self.returns);
            }
            let scale = (ret_rms.var()[0] + EPSILON).sqrt();
            for reward in &mut result.rewards {
                *reward = (*reward as f64 / scale).clamp(-CLIP, CLIP) as f32;
            }
        }

        for (ret, done) in self.returns.iter_mut().zip(dones) {
            if done {
                *ret = 0.0;
            }
        }
        Ok(result)
    }

    fn close(&mut self) -> Result<()> {
        self.venv.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::vec::{EnvFactory, InProcessVecEnv, testing::Counter};

    fn counters(n: usize) -> Box<dyn VecEnv> {
        let factories: Vec<EnvFactory<Counter>> = (0..n)
            .map(|i| -> EnvFactory<Counter> { Box::new(move || Ok(Counter::new(i as f32 * 10.0, 50))) })
            .collect();
        Box::new(InProcessVecEnv::new(factories).unwrap())
    }

    #[test]
    fn test_observations_are_whitened() {
        let mut envs = VecNormalize::new(counters(4), None);
        envs.reset().unwrap();
        for _ in 0..20 {
            let result = envs.step(&[0, 0, 0, 0]).unwrap();
            let mean: f32 = result.observations.iter().map(|o| o[0]).sum::<f32>() / 4.0;
            assert!(mean.abs() < 2.0);
            assert!(result.observations.iter().all(|o| o[0].abs() <= CLIP as f32));
        }
        assert!(envs.obs_rms().count() > 80.0);
    }

    #[test]
    fn test_rewards_untouched_without_gamma() {
        let mut envs = VecNormalize::new(counters(2), None);
        envs.reset().unwrap();
        let result = envs.step(&[1, 1]).unwrap();
        assert_eq!(result.rewards, vec![1.0, 1.0]);
    }

    #[test]
    fn test_rewards_scaled_with_gamma() {
        let mut envs = VecNormalize::new(counters(2), Some(0.99));
        envs.reset().unwrap();
        let mut last = Vec::new();
        for _ in 0..10 {
            last = envs.step(&[1, 1]).unwrap().rewards;
        }
        assert!(last.iter().all(|&r| r > 0.0 && r < 1.0));
    }

    #[test]
    fn test_frozen_statistics() {
        let mut envs = VecNormalize::new(counters(1), None);
        envs.set_training(false);
        envs.reset().unwrap();
        envs.step(&[0]).unwrap();
        assert!(envs.obs_rms().count() < 1.0);
    }
}
