//! Vectorized environment stepped on the calling thread

use anyhow::{Result, ensure};

use super::{EnvFactory, VecEnv, VecStepResult, step_auto_reset};
use crate::env::{Environment, SpaceInfo};

/// Runs every environment sequentially in the current thread
///
/// Used when a single environment is requested, where worker threads would
/// only add latency.
pub struct InProcessVecEnv<E> {
    envs: Vec<E>,
    observation_space: SpaceInfo,
    action_space: SpaceInfo,
}

impl<E> InProcessVecEnv<E>
where
    E: Environment<Observation = Vec<f32>, Action = i64> + Send,
{
    /// Build the environments from their factories
    pub fn new(factories: Vec<EnvFactory<E>>) -> Result<Self> {
        ensure!(!factories.is_empty(), "at least one environment is required");
        let envs = factories.into_iter().map(|make| make()).collect::<Result<Vec<E>>>()?;
        let observation_space = envs[0].observation_space();
        let action_space = envs[0].action_space();
        Ok(Self { envs, observation_space, action_space })
    }

    /// Wrapped environments
    pub fn envs(&self) -> &[E] {
        &self.envs
    }
}

impl<E> VecEnv for InProcessVecEnv<E>
where
    E: Environment<Observation = Vec<f32>, Action = i64> + Send,
{
    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn observation_space(&self) -> SpaceInfo {
        self.observation_space.clone()
    }

    fn action_space(&self) -> SpaceInfo {
        self.action_space.clone()
    }

    fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        self.envs.iter_mut().map(|env| env.reset()).collect()
    }

    fn step(&mut self, actions: &[i64]) -> Result<VecStepResult> {
        ensure!(
            actions.len() == self.envs.len(),
            "expected {} actions, got {}",
            self.envs.len(),
            actions.len()
        );
        let results = self
            .envs
            .iter_mut()
            .zip(actions)
            .map(|(env, &action)| step_auto_reset(env, action))
            .collect::<Result<Vec<_>>>()?;
        Ok(VecStepResult::from_results(results))
    }

    fn close(&mut self) -> Result<()> {
        self.envs.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::vec::testing::Counter;

    fn counters(n: usize, length: usize) -> InProcessVecEnv<Counter> {
        let factories: Vec<EnvFactory<Counter>> = (0..n)
            .map(|i| -> EnvFactory<Counter> { Box::new(move || Ok(Counter::new(i as f32 * 100.0, length))) })
            .collect();
        InProcessVecEnv::new(factories).unwrap()
    }

    #[test]
    fn test_reset_and_step() {
        let mut envs = counters(2, 5);
        assert_eq!(envs.reset().unwrap(), vec![vec![0.0], vec![100.0]]);

        let result = envs.step(&[1, 0]).unwrap();
        assert_eq!(result.observations, vec![vec![1.0], vec![101.0]]);
        assert_eq!(result.rewards, vec![1.0, 0.0]);
        assert_eq!(result.dones(), vec![false, false]);
    }

    #[test]
    fn test_auto_reset_keeps_terminal_observation() {
        let mut envs = counters(1, 2);
        envs.reset().unwrap();
        envs.step(&[0]).unwrap();

        let result = envs.step(&[0]).unwrap();
        assert!(result.terminated[0]);
        assert_eq!(result.observations[0], vec![0.0]);
        assert_eq!(result.infos[0].terminal_observation, Some(vec![2.0]));
    }

    #[test]
    fn test_action_count_mismatch() {
        let mut envs = counters(2, 5);
        envs.reset().unwrap();
        assert!(envs.step(&[0]).is_err());
    }

    #[test]
    fn test_empty_factories_rejected() {
        assert!(InProcessVecEnv::<Counter>::new(Vec::new()).is_err());
    }
}
