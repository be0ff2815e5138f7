//! Co-training of level generators and agents
//!
//! [`CoTrainer`] drives the loop; [`TrainerConfig`] controls its schedule.

pub mod config;
pub mod logs;
pub mod trainer;

pub use config::TrainerConfig;
pub use logs::{LevelReward, LevelRow, LossRow};
pub use trainer::{CoTrainer, Phase};
