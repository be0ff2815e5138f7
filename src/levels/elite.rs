//! Elite level ranking

use std::collections::BTreeMap;

/// Levels ranked by mean observed reward
///
/// Winning levels (mean reward > 0) come first in ascending order, so the
/// barely-won ones lead; losing levels follow in descending order, least bad
/// first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EliteSet {
    ranked: Vec<(usize, f32)>,
}

impl EliteSet {
    /// Rank levels from `(level id, reward)` samples
    ///
    /// Repeated plays of the same level are averaged before ranking.
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = (usize, f32)>,
    {
        let mut totals: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
        for (level, reward) in samples {
            let entry = totals.entry(level).or_insert((0.0, 0));
            entry.0 += reward as f64;
            entry.1 += 1;
        }

        let (mut winners, mut losers): (Vec<_>, Vec<_>) = totals
            .into_iter()
            .map(|(level, (sum, count))| (level, (sum / count as f64) as f32))
            .partition(|&(_, reward)| reward > 0.0);

        winners.sort_by(|a, b| a.1.total_cmp(&b.1));
        losers.sort_by(|a, b| b.1.total_cmp(&a.1));
        winners.extend(losers);

        Self { ranked: winners }
    }

    /// Build from an already ranked list, keeping its order
    pub fn from_ranked(ranked: Vec<(usize, f32)>) -> Self {
        Self { ranked }
    }

    /// Ranked `(level id, mean reward)` pairs
    pub fn ranked(&self) -> &[(usize, f32)] {
        &self.ranked
    }

    /// Level ids in rank order
    pub fn ids(&self) -> Vec<usize> {
        self.ranked.iter().map(|&(id, _)| id).collect()
    }

    /// The first `k` level ids in rank order
    pub fn top(&self, k: usize) -> Vec<usize> {
        self.ranked.iter().take(k).map(|&(id, _)| id).collect()
    }

    /// Mean reward of a ranked level
    pub fn reward(&self, level: usize) -> Option<f32> {
        self.ranked.iter().find(|&&(id, _)| id == level).map(|&(_, r)| r)
    }

    /// Number of ranked levels
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// Whether no level has been ranked
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}
