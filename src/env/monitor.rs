//! Episode monitor
//!
//! Wraps an environment, tracks per-episode reward and length, attaches an
//! [`EpisodeStats`] to the final step and optionally appends one row per
//! episode to `<log_dir>/<rank>.monitor.csv`.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Result, bail};
use serde::Serialize;

use super::{EpisodeStats, Environment, SpaceInfo, StepResult};
use crate::utils::logs::append_rows;

#[derive(Debug, Serialize)]
struct MonitorRow {
    r: f32,
    l: usize,
    t: f64,
}

/// Environment wrapper recording episode statistics
pub struct Monitor<E> {
    env: E,
    log_path: Option<PathBuf>,
    allow_early_resets: bool,
    start: Instant,
    episode_reward: f32,
    episode_length: usize,
    needs_reset: bool,
}

impl<E: Environment> Monitor<E> {
    /// Wrap `env`, logging to `<log_dir>/<rank>.monitor.csv` when a directory is given
    pub fn new(env: E, log_dir: Option<&Path>, rank: usize, allow_early_resets: bool) -> Result<Self> {
        let log_path = match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(dir.join(format!("{rank}.monitor.csv")))
            }
            None => None,
        };
        Ok(Self {
            env,
            log_path,
            allow_early_resets,
            start: Instant::now(),
            episode_reward: 0.0,
            episode_length: 0,
            needs_reset: true,
        })
    }
}

impl<E: Environment> Environment for Monitor<E> {
    type Observation = E::Observation;
    type Action = E::Action;

    fn reset(&mut self) -> Result<Self::Observation> {
        if !self.allow_early_resets && !self.needs_reset {
            bail!("tried to reset an environment before its episode ended");
        }
        self.episode_reward = 0.0;
        self.episode_length = 0;
        self.needs_reset = false;
        self.env.reset()
    }

    fn step(&mut self, action: Self::Action) -> Result<StepResult<Self::Observation>> {
        if self.needs_reset {
            bail!("tried to step an environment that needs a reset");
        }
        let mut result = self.env.step(action)?;
        self.episode_reward += result.reward;
        self.episode_length += 1;

        if result.done() {
            self.needs_reset = true;
            let stats = EpisodeStats {
                reward: self.episode_reward,
                length: self.episode_length,
                elapsed_secs: self.start.elapsed().as_secs_f64(),
            };
            if let Some(path) = &self.log_path {
                append_rows(path, &[MonitorRow { r: stats.reward, l: stats.length, t: stats.elapsed_secs }])?;
            }
            result.info.episode = Some(stats);
        }
        Ok(result)
    }

    fn observation_space(&self) -> SpaceInfo {
        self.env.observation_space()
    }

    fn action_space(&self) -> SpaceInfo {
        self.env.action_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{
        definition::{EnvDefinition, MazeDefinition},
        game::GridGame,
        source::FixedLevelSource,
    };
    use std::sync::Arc;

    fn game() -> GridGame {
        let def: Arc<dyn EnvDefinition> = Arc::new(MazeDefinition::default());
        let source = FixedLevelSource::new(vec!["wA.gw".to_string()]);
        GridGame::with_source(def, Box::new(source)).unwrap()
    }

    #[test]
    fn test_monitor_records_episode() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Monitor::new(game(), Some(dir.path()), 2, false).unwrap();

        env.reset().unwrap();
        assert!(env.step(2).unwrap().info.episode.is_none());
        let last = env.step(2).unwrap();
        let stats = last.info.episode.unwrap();
        assert_eq!(stats.length, 2);
        assert!((stats.reward - (1.1 - 1.0 / 50.0)).abs() < 1e-6);

        let log = std::fs::read_to_string(dir.path().join("2.monitor.csv")).unwrap();
        let mut lines = log.lines();
        assert_eq!(lines.next(), Some("r,l,t"));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn test_monitor_rejects_early_reset() {
        let mut env = Monitor::new(game(), None, 0, false).unwrap();
        env.reset().unwrap();
        env.step(0).unwrap();
        assert!(env.reset().is_err());

        let mut env = Monitor::new(game(), None, 0, true).unwrap();
        env.reset().unwrap();
        env.step(0).unwrap();
        assert!(env.reset().is_ok());
    }
}
