//! Level sources
//!
//! A [`LevelSource`] hands the grid adapter a new level on every reset and is
//! told how the episode on that level ended.

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tch::Kind;

use super::grid::Grid;
use crate::levels::LevelPool;

/// A level handed to the grid adapter
#[derive(Debug, Clone)]
pub struct GeneratedLevel {
    /// Pool id, if the level came from a pool
    pub id: Option<usize>,

    /// Ascii form loaded into the engine
    pub ascii: String,

    /// Encoded state to use as the first observation, if known
    pub state: Option<Grid>,
}

/// Supplies levels to a [`GridGame`](super::game::GridGame)
pub trait LevelSource: Send {
    /// Produce the level for the next episode
    fn new_level(&mut self) -> Result<GeneratedLevel>;

    /// Report the final reward of the episode played on the last level
    fn record_outcome(&mut self, _reward: f32) -> Result<()> {
        Ok(())
    }

    /// Reseed any internal randomness
    fn seed(&mut self, _seed: u64) {}
}

/// Replays playable levels from a scratch [`LevelPool`]
///
/// Each episode picks a random level without a `.no_compile` marker. The
/// final reward is appended to this source's fragment file.
pub struct PoolLevelSource {
    pool: LevelPool,
    rank: usize,
    current: Option<usize>,
    rng: StdRng,
}

impl PoolLevelSource {
    /// Serve levels from `pool`, logging rewards under `rank`
    pub fn new(pool: LevelPool, rank: usize) -> Self {
        Self { pool, rank, current: None, rng: StdRng::from_entropy() }
    }

    /// Id of the level handed out last
    pub fn current(&self) -> Option<usize> {
        self.current
    }
}

impl LevelSource for PoolLevelSource {
    fn new_level(&mut self) -> Result<GeneratedLevel> {
        let ids = self.pool.playable_level_ids()?;
        if ids.is_empty() {
            self.current = None;
            bail!("level pool {} has no playable levels", self.pool.dir().display());
        }
        let id = ids[self.rng.gen_range(0..ids.len())];
        self.current = Some(id);

        let ascii = self.pool.read_ascii(id)?;
        let tensor = self.pool.read_state(id)?.to_kind(Kind::Float);
        let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
        let state = match shape.as_slice() {
            [c, h, w] => {
                let cells = Vec::<f32>::try_from(&tensor.contiguous().view([-1]))?;
                Some(Grid::from_vec(*c, *h, *w, cells)?)
            }
            _ => None,
        };

        Ok(GeneratedLevel { id: Some(id), ascii, state })
    }

    fn record_outcome(&mut self, reward: f32) -> Result<()> {
        match self.current {
            Some(id) => self.pool.record_reward(self.rank, id, reward),
            None => Ok(()),
        }
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

/// Plays a fixed list of ascii levels in order, cycling
#[derive(Debug, Clone)]
pub struct FixedLevelSource {
    levels: Vec<String>,
    next: usize,
    outcomes: Vec<f32>,
}

impl FixedLevelSource {
    /// Serve `levels` in order
    pub fn new(levels: Vec<String>) -> Self {
        Self { levels, next: 0, outcomes: Vec::new() }
    }

    /// Final rewards reported so far, in play order
    pub fn outcomes(&self) -> &[f32] {
        &self.outcomes
    }
}

impl LevelSource for FixedLevelSource {
    fn new_level(&mut self) -> Result<GeneratedLevel> {
        if self.levels.is_empty() {
            bail!("no levels to play");
        }
        let index = self.next % self.levels.len();
        self.next += 1;
        Ok(GeneratedLevel { id: Some(index), ascii: self.levels[index].clone(), state: None })
    }

    fn record_outcome(&mut self, reward: f32) -> Result<()> {
        self.outcomes.push(reward);
        Ok(())
    }
}
