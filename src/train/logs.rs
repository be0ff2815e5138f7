//! Rows of the co-training CSV logs

use std::fmt;

use serde::{Serialize, Serializer};

/// Reward column of `levels.csv`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelReward {
    /// Reward observed by playing the level
    Observed(f32),

    /// The level has not been played yet
    Deferred,
}

impl fmt::Display for LevelReward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelReward::Observed(reward) => write!(f, "{reward}"),
            LevelReward::Deferred => f.write_str("NaN"),
        }
    }
}

impl Serialize for LevelReward {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LevelReward::Observed(reward) => serializer.serialize_f32(*reward),
            LevelReward::Deferred => serializer.serialize_str("NaN"),
        }
    }
}

/// One `levels.csv` row
#[derive(Debug, Clone, Serialize)]
pub struct LevelRow {
    /// Iteration that produced the level
    pub update: usize,

    /// Ascii level
    pub level: String,

    /// Simulated reward
    pub reward: LevelReward,

    /// Critic estimate at generation time
    pub expected_reward: f64,
}

/// One `losses.csv` row
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LossRow {
    /// Checkpointed iteration
    pub update: usize,

    /// Mean generator loss since the previous checkpoint
    pub gen_loss: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_reward_written_as_nan() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .serialize(LevelRow {
                update: 3,
                level: "w.A".to_string(),
                reward: LevelReward::Deferred,
                expected_reward: 0.5,
            })
            .unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text, "update,level,reward,expected_reward\n3,w.A,NaN,0.5\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(LevelReward::Deferred.to_string(), "NaN");
        assert_eq!(LevelReward::Observed(1.5).to_string(), "1.5");
    }
}
