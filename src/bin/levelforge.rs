//! Co-train a maze generator and a PPO agent
//!
//! # Usage
//!
//! ```bash
//! cargo run --release -- --save-dir runs/maze --updates 1000 --pool-size 32
//!
//! # resume and override hyperparameters from a JSON file
//! cargo run --release -- --save-dir runs/maze --resume-version 1000 --config maze.json
//! ```
//!
//! The JSON file may hold `trainer` and `agent` sections; missing fields keep
//! their defaults and command-line flags win over the file.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tch::Device;
use tracing_subscriber::EnvFilter;

use levelforge::{
    agent::{AgentConfig, PpoAgent},
    env::{EnvDefinition, MazeDefinition},
    generator::{MlpGenerator, MlpGeneratorConfig},
    train::{CoTrainer, TrainerConfig},
};

#[derive(Parser, Debug)]
#[command(name = "levelforge", version, about = "Co-train a level generator and an RL agent")]
struct Args {
    /// Directory for checkpoints and logs
    #[arg(long, default_value = "runs/maze")]
    save_dir: PathBuf,

    /// Co-training iterations to run
    #[arg(long, default_value_t = 1000)]
    updates: usize,

    /// Latent batch size of each generator update
    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Agent steps per iteration, scaled by the burst multiplier
    #[arg(long, default_value_t = 512)]
    rl_steps: usize,

    /// Parallel environments
    #[arg(long)]
    num_processes: Option<usize>,

    /// Resume from this checkpointed version
    #[arg(long)]
    resume_version: Option<usize>,

    /// Refresh a scratch pool of this many generated levels each iteration
    #[arg(long)]
    pool_size: Option<usize>,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Train on the CPU even when CUDA is available
    #[arg(long, default_value_t = false)]
    cpu: bool,

    /// JSON file with `trainer` and `agent` configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunConfig {
    trainer: TrainerConfig,
    agent: AgentConfig,
}

impl RunConfig {
    fn load(args: &Args) -> Result<Self> {
        let mut run = match &args.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => RunConfig::default(),
        };

        run.trainer.save_dir = args.save_dir.clone();
        if let Some(version) = args.resume_version {
            run.trainer.resume_version = version;
        }
        if let Some(size) = args.pool_size {
            run.trainer.pool_size = Some(size);
        }
        if let Some(n) = args.num_processes {
            run.agent.num_processes = n;
        }
        run.agent.seed = args.seed;
        if run.agent.log_dir.is_none() {
            run.agent.log_dir = Some(args.save_dir.join("monitor"));
        }
        Ok(run)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let run = RunConfig::load(&args)?;

    let device = if args.cpu { Device::Cpu } else { Device::cuda_if_available() };
    tch::manual_seed(args.seed as i64);

    let definition: Arc<dyn EnvDefinition> = Arc::new(MazeDefinition::default());
    let [_, height, width] = definition.state_shape();
    let generator_config =
        MlpGeneratorConfig::new().level(MazeDefinition::num_tiles(), height, width).state_shape(definition.state_shape());

    tracing::info!("Co-training on {}", definition.name());
    tracing::info!("  Device: {:?}", device);
    tracing::info!("  Save dir: {}", run.trainer.save_dir.display());
    tracing::info!("  Environments: {}", run.agent.num_processes);
    tracing::info!("  Updates: {} (batch {}, rl steps {})", args.updates, args.batch_size, args.rl_steps);

    let generator = MlpGenerator::new(generator_config, device)?;
    let agent = PpoAgent::new(definition.clone(), run.agent, device)?;
    let mut trainer = CoTrainer::new(generator, agent, definition, run.trainer.device(device))?;

    trainer.train(args.updates, args.batch_size, args.rl_steps)?;
    tracing::info!("Finished at version {}", trainer.version());
    Ok(())
}
