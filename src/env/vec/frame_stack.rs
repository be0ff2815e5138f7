//! Frame stacking along the leading (channel) axis

use anyhow::{Result, ensure};

use super::{VecEnv, VecStepResult};
use crate::env::SpaceInfo;

/// Concatenates the last `nstack` observations of every environment
///
/// The newest frame occupies the last slot. History is cleared when an
/// episode ends so frames never leak across episodes.
pub struct FrameStack {
    venv: Box<dyn VecEnv>,
    nstack: usize,
    frame_len: usize,
    stacked: Vec<Vec<f32>>,
}

impl FrameStack {
    /// Wrap `venv`, stacking `nstack` frames
    pub fn new(venv: Box<dyn VecEnv>, nstack: usize) -> Result<Self> {
        ensure!(nstack > 0, "nstack must be positive");
        let space = venv.observation_space();
        ensure!(!space.shape.is_empty(), "cannot stack scalar observations");
        let frame_len = space.flat_len();
        let stacked = vec![vec![0.0; frame_len * nstack]; venv.num_envs()];
        Ok(Self { venv, nstack, frame_len, stacked })
    }

    fn push(&mut self, env: usize, frame: &[f32]) {
        let buffer = &mut self.stacked[env];
        buffer.rotate_left(self.frame_len);
        let start = buffer.len() - self.frame_len;
        buffer[start..].copy_from_slice(frame);
    }
}

impl VecEnv for FrameStack {
    fn num_envs(&self) -> usize {
        self.venv.num_envs()
    }

    fn observation_space(&self) -> SpaceInfo {
        let mut space = self.venv.observation_space();
        space.shape[0] *= self.nstack;
        space
    }

    fn action_space(&self) -> SpaceInfo {
        self.venv.action_space()
    }

    fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        let observations = self.venv.reset()?;
        for (env, obs) in observations.iter().enumerate() {
            self.stacked[env].iter_mut().for_each(|v| *v = 0.0);
            self.push(env, obs);
        }
        Ok(self.stacked.clone())
    }

    fn step(&mut self, actions: &[i64]) -> Result<VecStepResult> {
        let mut result = self.venv.step(actions)?;
        let dones = result.dones();
        for (env, obs) in result.observations.iter().enumerate() {
            if dones[env] {
                self.stacked[env].iter_mut().for_each(|v| *v = 0.0);
            }
            self.push(env, obs);
        }
        result.observations = self.stacked.clone();
        Ok(result)
    }

    fn close(&mut self) -> Result<()> {
        self.venv.close()
    }
}
