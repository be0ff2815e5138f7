//! PPO agent over vectorized grid games
//!
//! # Training loop
//!
//! ```text
//! For each update in the step budget:
//!   1. Collect num_steps transitions from every environment
//!   2. Compute advantages using GAE
//!   3. For n_epochs:
//!      a. Sample shuffled minibatches
//!      b. Compute PPO loss (clipped objective)
//!      c. Update policy via gradient descent
//! ```

use std::{collections::VecDeque, fs, path::Path, sync::Arc};

use anyhow::{Context, Result, anyhow};
use rand::{SeedableRng, rngs::StdRng};
use tch::{
    Device, Kind, Tensor,
    nn::{self, OptimizerConfig},
};

use super::{
    Agent, ActorCritic, AgentConfig,
    loss::{compute_entropy_loss, compute_policy_loss, compute_value_loss, generate_minibatch_indices},
    network::GridActorCritic,
    rollout::RolloutBuffer,
    stats::TrainingStats,
};
use crate::{
    env::{
        EnvDefinition, EpisodeStats, Environment, GridGame,
        source::{FixedLevelSource, LevelSource, PoolLevelSource},
        vec::{SourceFactory, VecEnv, VecEnvConfig, make_vec_envs},
    },
    levels::LevelPool,
};

const RECENT_EPISODES: usize = 100;

fn to_tensor(observations: &[Vec<f32>], device: Device) -> Tensor {
    let flat = observations.concat();
    Tensor::from_slice(&flat).view([observations.len() as i64, -1]).to_device(device)
}

/// Proximal Policy Optimization agent
pub struct PpoAgent {
    config: AgentConfig,
    definition: Arc<dyn EnvDefinition>,
    device: Device,
    vs: nn::VarStore,
    network: GridActorCritic,
    optimizer: nn::Optimizer,
    envs: Option<Box<dyn VecEnv>>,
    observations: Vec<Vec<f32>>,
    rng: StdRng,
    total_steps: usize,
    total_updates: usize,
    recent_episodes: VecDeque<EpisodeStats>,
}

impl PpoAgent {
    /// Create an agent for `definition` with parameters on `device`
    pub fn new(definition: Arc<dyn EnvDefinition>, config: AgentConfig, device: Device) -> Result<Self> {
        config.validate()?;
        let vs = nn::VarStore::new(device);
        let network = GridActorCritic::new(
            &vs.root(),
            definition.state_shape(),
            definition.num_actions(),
            config.conv_channels,
            config.hidden_dim,
        );
        let optimizer = nn::Adam::default().build(&vs, config.learning_rate)?;
        let rng = StdRng::seed_from_u64(config.seed);

        tracing::info!("PpoAgent for {} using device: {:?}", definition.name(), device);
        Ok(Self {
            config,
            definition,
            device,
            vs,
            network,
            optimizer,
            envs: None,
            observations: Vec::new(),
            rng,
            total_steps: 0,
            total_updates: 0,
            recent_episodes: VecDeque::with_capacity(RECENT_EPISODES),
        })
    }

    /// Checkpoint file for `version` under `dir`
    pub fn checkpoint_path(dir: &Path, version: usize) -> std::path::PathBuf {
        dir.join(format!("agent_{version}.ot"))
    }

    /// Configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Policy network
    pub fn network(&self) -> &GridActorCritic {
        &self.network
    }

    /// Environment steps collected so far
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// PPO updates performed so far
    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Mean reward of the most recent finished training episodes
    pub fn mean_episode_reward(&self) -> Option<f32> {
        if self.recent_episodes.is_empty() {
            return None;
        }
        let total: f32 = self.recent_episodes.iter().map(|e| e.reward).sum();
        Some(total / self.recent_episodes.len() as f32)
    }

    fn record_episode(&mut self, stats: EpisodeStats) {
        if self.recent_episodes.len() == RECENT_EPISODES {
            self.recent_episodes.pop_front();
        }
        self.recent_episodes.push_back(stats);
    }

    fn collect_rollout(&mut self, buffer: &mut RolloutBuffer) -> Result<()> {
        let envs = self.envs.as_mut().ok_or_else(|| anyhow!("environments not set"))?;
        buffer.clear();

        let mut finished = Vec::new();
        for _ in 0..self.config.num_steps {
            let obs = to_tensor(&self.observations, self.device);
            let (actions, log_probs, values) = tch::no_grad(|| self.network.act(&obs));
            let actions = Vec::<i64>::try_from(&actions.to_device(Device::Cpu))?;
            let log_probs = Vec::<f32>::try_from(&log_probs.to_device(Device::Cpu))?;
            let values = Vec::<f32>::try_from(&values.to_device(Device::Cpu))?;

            let result = envs.step(&actions)?;
            let dones = result.dones();
            buffer.push(&self.observations, &actions, &result.rewards, &values, &log_probs, &dones)?;

            finished.extend(result.infos.iter().filter_map(|info| info.episode));
            self.observations = result.observations;
        }

        self.total_steps += self.config.num_steps * self.observations.len();
        for stats in finished {
            self.record_episode(stats);
        }
        Ok(())
    }

    fn update(&mut self, buffer: &RolloutBuffer) -> Result<TrainingStats> {
        let batch = buffer.batch(self.device);
        let n = batch.actions.size()[0] as usize;
        let mut stats = TrainingStats::default();

        'epochs: for _ in 0..self.config.n_epochs {
            for indices in generate_minibatch_indices(n, self.config.batch_size, &mut self.rng) {
                let idx = Tensor::from_slice(&indices).to_device(self.device);
                let mb_obs = batch.observations.index_select(0, &idx);
                let mb_actions = batch.actions.index_select(0, &idx);
                let mb_old_log_probs = batch.log_probs.index_select(0, &idx);
                let mb_old_values = batch.values.index_select(0, &idx);
                let mb_returns = batch.returns.index_select(0, &idx);
                let mb_advantages = batch.advantages.index_select(0, &idx);

                // minibatch-level advantage normalization
                let mb_advantages = (&mb_advantages - mb_advantages.mean(Kind::Float))
                    / (mb_advantages.std(false) + 1e-8);

                let (log_probs, entropy, values) = self.network.evaluate_actions(&mb_obs, &mb_actions);

                let (policy_loss, clip_fraction, approx_kl) = compute_policy_loss(
                    &log_probs,
                    &mb_old_log_probs,
                    &mb_advantages,
                    self.config.clip_range,
                );
                let (value_loss, explained_var) = compute_value_loss(
                    &values,
                    &mb_old_values,
                    &mb_returns,
                    self.config.clip_range_vf,
                );
                let entropy_loss = compute_entropy_loss(&entropy);

                let loss = &policy_loss
                    + self.config.vf_coef * &value_loss
                    + self.config.ent_coef * &entropy_loss;

                self.optimizer.zero_grad();
                loss.backward();
                self.optimizer.clip_grad_norm(self.config.max_grad_norm);
                self.optimizer.step();

                stats += &TrainingStats::new(
                    policy_loss.double_value(&[]),
                    value_loss.double_value(&[]),
                    entropy.double_value(&[]),
                    clip_fraction,
                    approx_kl,
                    explained_var,
                );

                if self.config.target_kl.is_some_and(|target| approx_kl > 1.5 * target) {
                    tracing::debug!(approx_kl, "stopping PPO epochs early on KL divergence");
                    break 'epochs;
                }
            }
        }

        self.total_updates += 1;
        Ok(stats.average())
    }
}

impl Agent for PpoAgent {
    fn load(&mut self, dir: &Path, version: usize) -> Result<()> {
        let path = Self::checkpoint_path(dir, version);
        self.vs
            .load(&path)
            .with_context(|| format!("failed to load agent checkpoint {}", path.display()))?;
        tracing::info!("loaded agent version {} from {}", version, path.display());
        Ok(())
    }

    fn save(&self, dir: &Path, version: usize) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = Self::checkpoint_path(dir, version);
        self.vs
            .save(&path)
            .with_context(|| format!("failed to save agent checkpoint {}", path.display()))?;
        Ok(())
    }

    fn set_envs(&mut self, pool: Option<&Path>) -> Result<()> {
        self.close_envs()?;

        let sources: Option<SourceFactory> = match pool {
            Some(dir) => {
                let pool = LevelPool::open(dir)?;
                if pool.playable_level_ids()?.is_empty() {
                    tracing::warn!("level pool {} has no playable levels", dir.display());
                }
                Some(Arc::new(move |rank: usize| -> Result<Box<dyn LevelSource>> {
                    Ok(Box::new(PoolLevelSource::new(pool.clone(), rank)))
                }))
            }
            None => None,
        };

        let vec_config = VecEnvConfig {
            num_processes: self.config.num_processes,
            seed: self.config.seed.wrapping_add(self.total_steps as u64),
            gamma: Some(self.config.gamma),
            log_dir: self.config.log_dir.clone(),
            allow_early_resets: true,
            num_frame_stack: None,
        };
        let mut envs = make_vec_envs(self.definition.clone(), sources, &vec_config)?;
        self.observations = envs.reset()?;
        self.envs = Some(envs);

        tracing::debug!(pool = ?pool, "agent environments ready");
        Ok(())
    }

    fn train_agent(&mut self, step_budget: usize) -> Result<()> {
        let (num_envs, obs_dim) = match &self.envs {
            Some(envs) => (envs.num_envs(), envs.observation_space().flat_len()),
            None => return Err(anyhow!("environments not set; call set_envs before train_agent")),
        };
        let num_updates = step_budget.div_ceil(self.config.steps_per_update());
        let mut buffer = RolloutBuffer::new(self.config.num_steps, num_envs, obs_dim);
        let mut stats = TrainingStats::default();

        for _ in 0..num_updates {
            self.collect_rollout(&mut buffer)?;

            let obs = to_tensor(&self.observations, self.device);
            let last_values = tch::no_grad(|| self.network.forward(&obs).1.squeeze_dim(-1));
            let last_values = Vec::<f32>::try_from(&last_values.to_device(Device::Cpu))?;
            buffer.compute_advantages(&last_values, self.config.gamma as f32, self.config.gae_lambda as f32);

            let update = self.update(&buffer)?;
            tracing::debug!(
                policy_loss = update.policy_loss,
                value_loss = update.value_loss,
                entropy = update.entropy,
                "PPO update {}",
                self.total_updates
            );
            stats += &update;
        }

        let stats = stats.average();
        tracing::info!(
            updates = num_updates,
            total_steps = self.total_steps,
            value_loss = stats.value_loss,
            mean_reward = ?self.mean_episode_reward(),
            "agent training burst finished"
        );
        Ok(())
    }

    fn play(&mut self, levels: &[String]) -> Result<Vec<f32>> {
        let mut games = levels
            .iter()
            .map(|level| {
                let source = FixedLevelSource::new(vec![level.clone()]);
                let mut game = GridGame::with_source(self.definition.clone(), Box::new(source))?;
                game.seed(self.config.seed);
                Ok(game)
            })
            .collect::<Result<Vec<_>>>()?;
        let mut observations = games.iter_mut().map(|game| game.reset()).collect::<Result<Vec<_>>>()?;
        let mut rewards: Vec<Option<f32>> = vec![None; games.len()];

        loop {
            let active: Vec<usize> = (0..games.len()).filter(|&i| rewards[i].is_none()).collect();
            if active.is_empty() {
                break;
            }
            let batch: Vec<Vec<f32>> = active.iter().map(|&i| observations[i].clone()).collect();
            let obs = to_tensor(&batch, self.device);
            let actions = tch::no_grad(|| self.network.greedy_action(&obs));
            let actions = Vec::<i64>::try_from(&actions.to_device(Device::Cpu))?;

            for (&i, &action) in active.iter().zip(&actions) {
                let step = games[i].step(action)?;
                if step.done() {
                    rewards[i] = Some(step.reward);
                } else {
                    observations[i] = step.observation;
                }
            }
        }

        Ok(rewards.into_iter().flatten().collect())
    }

    fn close_envs(&mut self) -> Result<()> {
        self.observations.clear();
        match self.envs.take() {
            Some(mut envs) => envs.close(),
            None => Ok(()),
        }
    }

    fn actor_critic(&self) -> &dyn ActorCritic {
        &self.network
    }
}
