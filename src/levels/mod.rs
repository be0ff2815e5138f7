//! Scratch level pool
//!
//! Generated levels live in a scratch directory between training rounds:
//!
//! ```text
//! lvl_<id>.npy          encoded state tensor
//! lvl_<id>.txt          ascii level
//! lvl_<id>.no_compile   empty marker, level failed the definition's checks
//! fragment_<rank>.csv   level,reward rows appended by environment <rank>
//! rewards.csv           level,reward ranking written by `recompute`
//! ```
//!
//! Environments replaying pool levels append their episode rewards to a
//! per-rank fragment. Once per round the coordinator folds the fragments into
//! an [`EliteSet`] and decides which slots to keep and which to regenerate.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tch::{Device, Tensor};

use crate::utils::logs::append_rows;

pub mod elite;

pub use elite::EliteSet;

/// File holding the latest ranking
pub const REWARDS_FILE: &str = "rewards.csv";

const LEVEL_PREFIX: &str = "lvl_";
const FRAGMENT_PREFIX: &str = "fragment_";

/// One `level,reward` row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardRow {
    /// Level id
    pub level: usize,

    /// Observed reward
    pub reward: f32,
}

/// Directory of generated levels and their reward logs
#[derive(Debug, Clone)]
pub struct LevelPool {
    dir: PathBuf,
}

impl LevelPool {
    /// Open a pool rooted at `dir`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create level pool {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Pool directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn level_file(&self, id: usize, extension: &str) -> PathBuf {
        self.dir.join(format!("{LEVEL_PREFIX}{id}.{extension}"))
    }

    /// Write a level's state tensor and ascii form
    ///
    /// A `.no_compile` marker is created when `passes` is false and removed
    /// if a previous level in the same slot left one behind.
    pub fn write_level(&self, id: usize, state: &Tensor, ascii: &str, passes: bool) -> Result<()> {
        let npy = self.level_file(id, "npy");
        state
            .to_device(Device::Cpu)
            .write_npy(&npy)
            .with_context(|| format!("failed to write {}", npy.display()))?;

        let txt = self.level_file(id, "txt");
        fs::write(&txt, ascii).with_context(|| format!("failed to write {}", txt.display()))?;

        let marker = self.level_file(id, "no_compile");
        if passes {
            if marker.exists() {
                fs::remove_file(&marker)
                    .with_context(|| format!("failed to remove {}", marker.display()))?;
            }
        } else {
            fs::write(&marker, b"").with_context(|| format!("failed to write {}", marker.display()))?;
        }
        Ok(())
    }

    /// Read a level's state tensor onto `device` and its ascii form
    pub fn read_level(&self, id: usize, device: Device) -> Result<(Tensor, String)> {
        Ok((self.read_state(id)?.to_device(device), self.read_ascii(id)?))
    }

    /// Read a level's state tensor on the CPU
    pub fn read_state(&self, id: usize) -> Result<Tensor> {
        let npy = self.level_file(id, "npy");
        Tensor::read_npy(&npy).with_context(|| format!("failed to read {}", npy.display()))
    }

    /// Read a level's ascii form
    pub fn read_ascii(&self, id: usize) -> Result<String> {
        let txt = self.level_file(id, "txt");
        fs::read_to_string(&txt).with_context(|| format!("failed to read {}", txt.display()))
    }

    /// Whether the level has no `.no_compile` marker
    pub fn is_compilable(&self, id: usize) -> bool {
        !self.level_file(id, "no_compile").exists()
    }

    /// Ids of every stored level, ascending
    pub fn level_ids(&self) -> Result<Vec<usize>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let id = name
                .strip_prefix(LEVEL_PREFIX)
                .and_then(|rest| rest.strip_suffix(".txt"))
                .and_then(|id| id.parse::<usize>().ok());
            if let Some(id) = id {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Ids of stored levels without a `.no_compile` marker
    pub fn playable_level_ids(&self) -> Result<Vec<usize>> {
        Ok(self.level_ids()?.into_iter().filter(|&id| self.is_compilable(id)).collect())
    }

    /// Append one reward sample to environment `rank`'s fragment
    pub fn record_reward(&self, rank: usize, level: usize, reward: f32) -> Result<()> {
        let path = self.dir.join(format!("{FRAGMENT_PREFIX}{rank}.csv"));
        append_rows(&path, &[RewardRow { level, reward }])
    }

    /// Reward fragments waiting to be folded into the ranking
    pub fn fragment_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let path = entry?.path();
            let is_csv = path.extension().is_some_and(|ext| ext == "csv");
            let is_ranking = path.file_name().is_some_and(|name| name == REWARDS_FILE);
            if is_csv && !is_ranking {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Fold all reward fragments into a fresh ranking
    ///
    /// Fragments are consumed. The ranking is written to `rewards.csv` when
    /// it is not empty. Unreadable rows are skipped.
    pub fn recompute(&self) -> Result<EliteSet> {
        let paths = self.fragment_paths()?;

        let samples: Vec<RewardRow> =
            paths.par_iter().flat_map_iter(|path| read_fragment(path)).collect();

        for path in &paths {
            fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
        }

        let elite = EliteSet::from_samples(samples.iter().map(|row| (row.level, row.reward)));
        if !elite.is_empty() {
            self.write_rankings(&elite)?;
        }
        tracing::debug!(
            fragments = paths.len(),
            samples = samples.len(),
            ranked = elite.len(),
            "recomputed elite levels"
        );
        Ok(elite)
    }

    fn write_rankings(&self, elite: &EliteSet) -> Result<()> {
        let path = self.dir.join(REWARDS_FILE);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        for &(level, reward) in elite.ranked() {
            writer.serialize(RewardRow { level, reward })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read the ranking last written by [`recompute`](Self::recompute)
    pub fn read_rankings(&self) -> Result<EliteSet> {
        let path = self.dir.join(REWARDS_FILE);
        if !path.exists() {
            return Ok(EliteSet::default());
        }
        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let ranked = reader
            .deserialize::<RewardRow>()
            .map(|row| row.map(|r| (r.level, r.reward)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(EliteSet::from_ranked(ranked))
    }
}

fn read_fragment(path: &Path) -> Vec<RewardRow> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!("skipping reward fragment {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    reader
        .deserialize::<RewardRow>()
        .filter_map(|row| match row {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::warn!("skipping malformed row in {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn pool() -> (tempfile::TempDir, LevelPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = LevelPool::open(dir.path()).unwrap();
        (dir, pool)
    }

    #[test]
    fn test_level_round_trip() {
        let (_dir, pool) = pool();
        let state = Tensor::rand([5, 7, 11], (Kind::Float, Device::Cpu));
        let ascii = "wwww\nwAgw\nwwww";

        pool.write_level(3, &state, ascii, true).unwrap();
        let (read_state, read_ascii) = pool.read_level(3, Device::Cpu).unwrap();

        assert_eq!(read_ascii, ascii);
        assert_eq!(read_state.size(), vec![5, 7, 11]);
        assert!(read_state.equal(&state));
    }

    #[test]
    fn test_no_compile_marker() {
        let (_dir, pool) = pool();
        let state = Tensor::zeros([1, 1, 1], (Kind::Float, Device::Cpu));

        pool.write_level(0, &state, "w", false).unwrap();
        pool.write_level(1, &state, "wAg", true).unwrap();
        assert!(!pool.is_compilable(0));
        assert!(pool.is_compilable(1));
        assert_eq!(pool.level_ids().unwrap(), vec![0, 1]);
        assert_eq!(pool.playable_level_ids().unwrap(), vec![1]);

        // overwriting with a passing level clears the stale marker
        pool.write_level(0, &state, "wAg", true).unwrap();
        assert!(pool.is_compilable(0));
    }

    #[test]
    fn test_recompute_without_fragments_is_empty() {
        let (_dir, pool) = pool();
        let elite = pool.recompute().unwrap();
        assert!(elite.is_empty());
        assert!(!pool.dir().join(REWARDS_FILE).exists());
    }

    #[test]
    fn test_recompute_consumes_fragments() {
        let (_dir, pool) = pool();
        pool.record_reward(0, 0, 5.0).unwrap();
        pool.record_reward(0, 1, -2.0).unwrap();
        pool.record_reward(1, 2, 1.0).unwrap();
        pool.record_reward(1, 3, -1.0).unwrap();
        pool.record_reward(1, 2, 1.0).unwrap();

        let elite = pool.recompute().unwrap();
        assert_eq!(elite.ids(), vec![2, 0, 3, 1]);
        assert!(pool.fragment_paths().unwrap().is_empty());

        let persisted = pool.read_rankings().unwrap();
        assert_eq!(persisted, elite);

        // the ranking file is not treated as a fragment next round
        assert!(pool.recompute().unwrap().is_empty());
    }

    #[test]
    fn test_recompute_skips_malformed_rows() {
        let (_dir, pool) = pool();
        fs::write(pool.dir().join("fragment_9.csv"), "level,reward\n4,0.5\nbad,row\n5,-0.25\n")
            .unwrap();
        fs::write(pool.dir().join("fragment_8.csv"), "").unwrap();

        let elite = pool.recompute().unwrap();
        assert_eq!(elite.ids(), vec![4, 5]);
    }
}
