//! End-to-end co-training on CPU
//!
//! Runs a few tiny iterations with a real PPO agent and checks that every
//! artifact lands where resuming expects it, then resumes from disk.

use std::{path::Path, sync::Arc};

use levelforge::{
    agent::{AgentConfig, PpoAgent},
    env::{EnvDefinition, MazeDefinition},
    generator::{MlpGenerator, MlpGeneratorConfig},
    train::{CoTrainer, Phase, TrainerConfig},
};
use tch::Device;

fn definition() -> Arc<dyn EnvDefinition> {
    Arc::new(MazeDefinition::default())
}

fn agent(definition: &Arc<dyn EnvDefinition>) -> PpoAgent {
    let config = AgentConfig::new().num_steps(8).num_processes(2).batch_size(8).n_epochs(1).network(4, 16);
    PpoAgent::new(definition.clone(), config, Device::Cpu).unwrap()
}

fn generator() -> MlpGenerator {
    MlpGenerator::new(MlpGeneratorConfig::new().z_size(8).hidden_dim(32), Device::Cpu).unwrap()
}

fn trainer_config(dir: &Path) -> TrainerConfig {
    TrainerConfig::new().save_dir(dir).budgets(1, 1).pool_size(4).device(Device::Cpu)
}

fn count_rows(path: &Path) -> usize {
    csv::Reader::from_path(path).unwrap().records().count()
}

#[test]
fn test_co_training_writes_checkpoints_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    let definition = definition();

    let mut trainer =
        CoTrainer::new(generator(), agent(&definition), definition.clone(), trainer_config(dir.path())).unwrap();
    trainer.train(2, 4, 16).unwrap();

    assert_eq!(trainer.version(), 2);
    assert_eq!(trainer.phase(), Phase::Done);
    for version in 1..=2 {
        assert!(dir.path().join(format!("models/checkpoint_{version}.ot")).exists());
        assert!(dir.path().join(format!("agents/agent_{version}.ot")).exists());
    }
    assert_eq!(count_rows(&dir.path().join("losses.csv")), 2);
    assert_eq!(count_rows(&dir.path().join("levels.csv")), 2);
    assert_eq!(trainer.pool().level_ids().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn test_resume_continues_version_numbering() {
    let dir = tempfile::tempdir().unwrap();
    let definition = definition();

    {
        let mut trainer =
            CoTrainer::new(generator(), agent(&definition), definition.clone(), trainer_config(dir.path()))
                .unwrap();
        trainer.train(1, 4, 16).unwrap();
    }

    let config = trainer_config(dir.path()).resume_version(1);
    let mut resumed = CoTrainer::new(generator(), agent(&definition), definition.clone(), config).unwrap();
    assert_eq!(resumed.version(), 1);

    resumed.train(1, 4, 16).unwrap();
    assert_eq!(resumed.version(), 2);
    assert!(dir.path().join("models/checkpoint_2.ot").exists());

    let updates: Vec<String> = csv::Reader::from_path(dir.path().join("losses.csv"))
        .unwrap()
        .records()
        .map(|row| row.unwrap()[0].to_string())
        .collect();
    assert_eq!(updates, vec!["1", "2"]);
}
