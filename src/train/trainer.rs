//! Co-training loop
//!
//! [`CoTrainer`] alternates between two learners. The agent trains on the
//! current levels, then the generator is pushed towards levels the agent's
//! critic rates at `target_value`. Both models are checkpointed under the
//! save directory tagged with the iteration number.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use tch::{
    Device, Kind, Reduction, Tensor,
    nn::{self, OptimizerConfig},
};
use tempfile::TempDir;

use super::{
    config::TrainerConfig,
    logs::{LevelReward, LevelRow, LossRow},
};
use crate::{
    agent::Agent, env::EnvDefinition, generator::LevelGenerator, levels::LevelPool,
    utils::logs::append_rows,
};

const META_VERSION: &str = "__meta__.version";
const META_GEN_LOSS: &str = "__meta__.gen_loss";
const META_LEARNING_RATE: &str = "__meta__.learning_rate";
const META_OPTIMIZER_STEPS: &str = "__meta__.optimizer_steps";

/// Stage of the co-training loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Pretraining the agent before the first generator update
    ColdStart,

    /// Agent burst on the current levels
    AgentTraining,

    /// Generator gradient steps against the critic
    GeneratorUpdate,

    /// Writing checkpoints and loss logs
    Checkpoint,

    /// All requested iterations completed
    Done,
}

/// Coordinator of generator and agent training
pub struct CoTrainer<G, A> {
    config: TrainerConfig,
    generator: G,
    agent: A,
    definition: Arc<dyn EnvDefinition>,
    optimizer: nn::Optimizer,
    optimizer_steps: usize,
    pool: LevelPool,
    fresh: LevelPool,
    // keeps both pools alive for the trainer's lifetime
    _scratch: TempDir,
    version: usize,
    phase: Phase,
}

impl<G: LevelGenerator, A: Agent> CoTrainer<G, A> {
    /// Create a trainer, resuming from `config.resume_version` when set
    pub fn new(
        generator: G,
        agent: A,
        definition: Arc<dyn EnvDefinition>,
        config: TrainerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let state_shape = generator.state_shape();
        if state_shape != definition.state_shape() {
            bail!(
                "generator produces states of shape {:?} but {} observes {:?}",
                state_shape,
                definition.name(),
                definition.state_shape()
            );
        }
        if generator.device() != config.device {
            bail!(
                "generator lives on {:?} but the trainer samples on {:?}",
                generator.device(),
                config.device
            );
        }

        for dir in [config.save_dir.join("agents"), config.save_dir.join("models")] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let scratch = tempfile::Builder::new()
            .prefix("levelforge-pool-")
            .tempdir()
            .context("failed to create scratch level pool")?;
        let pool = LevelPool::open(scratch.path().join("pool"))?;
        let fresh = LevelPool::open(scratch.path().join("fresh"))?;

        let optimizer = nn::Adam::default().build(generator.var_store(), config.learning_rate)?;

        let resume_version = config.resume_version;
        let mut trainer = Self {
            config,
            generator,
            agent,
            definition,
            optimizer,
            optimizer_steps: 0,
            pool,
            fresh,
            _scratch: scratch,
            version: 0,
            phase: Phase::ColdStart,
        };
        if resume_version > 0 {
            trainer.load(resume_version)?;
        }
        Ok(trainer)
    }

    /// Completed iterations
    pub fn version(&self) -> usize {
        self.version
    }

    /// Current stage
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Get the configuration
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Get reference to the generator
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Get reference to the agent
    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// Scratch level pool replayed by the agent
    pub fn pool(&self) -> &LevelPool {
        &self.pool
    }

    /// Levels written by [`new_levels`](Self::new_levels), never replayed
    pub fn fresh_levels(&self) -> &LevelPool {
        &self.fresh
    }

    /// Directory of agent checkpoints
    pub fn agents_dir(&self) -> PathBuf {
        self.config.save_dir.join("agents")
    }

    /// Directory of generator checkpoints
    pub fn models_dir(&self) -> PathBuf {
        self.config.save_dir.join("models")
    }

    /// Generator checkpoint for `version` under `dir`
    pub fn checkpoint_path(dir: &Path, version: usize) -> PathBuf {
        dir.join(format!("checkpoint_{version}.ot"))
    }

    fn levels_log(&self) -> PathBuf {
        self.config.save_dir.join("levels.csv")
    }

    fn loss_log(&self) -> PathBuf {
        self.config.save_dir.join("losses.csv")
    }

    fn set_phase(&mut self, phase: Phase) {
        tracing::debug!(version = self.version, ?phase, "co-training phase");
        self.phase = phase;
    }

    /// Restore both models from the checkpoints tagged `version`
    pub fn load(&mut self, version: usize) -> Result<()> {
        self.agent.load(&self.agents_dir(), version)?;

        let path = Self::checkpoint_path(&self.models_dir(), version);
        self.generator
            .var_store_mut()
            .load(&path)
            .with_context(|| format!("failed to load generator from {}", path.display()))?;

        let named = Tensor::load_multi(&path)
            .with_context(|| format!("failed to read checkpoint metadata from {}", path.display()))?;
        let meta = |key: &str| checkpoint_meta(&named, key, &path);

        let stored = meta(META_VERSION)? as i64;
        ensure!(
            stored == version as i64,
            "{} holds version {}, expected {}",
            path.display(),
            stored,
            version
        );
        let learning_rate = meta(META_LEARNING_RATE)?;
        let gen_loss = meta(META_GEN_LOSS)?;
        self.optimizer_steps = meta(META_OPTIMIZER_STEPS)? as usize;
        self.optimizer.set_lr(learning_rate);
        self.version = version;

        tracing::info!(version, gen_loss, "resumed from {}", path.display());
        Ok(())
    }

    /// Checkpoint both models tagged with `version`
    pub fn save_models(&self, version: usize, gen_loss: f64) -> Result<()> {
        self.agent.save(&self.agents_dir(), version)?;

        let mut named: Vec<(String, Tensor)> =
            self.generator.var_store().variables().into_iter().collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        named.push((META_VERSION.to_string(), Tensor::from_slice(&[version as i64])));
        named.push((META_GEN_LOSS.to_string(), Tensor::from_slice(&[gen_loss])));
        named.push((
            META_LEARNING_RATE.to_string(),
            Tensor::from_slice(&[self.config.learning_rate]),
        ));
        named.push((
            META_OPTIMIZER_STEPS.to_string(),
            Tensor::from_slice(&[self.optimizer_steps as i64]),
        ));

        let path = Self::checkpoint_path(&self.models_dir(), version);
        Tensor::save_multi(&named, &path)
            .with_context(|| format!("failed to save generator to {}", path.display()))?;
        Ok(())
    }

    /// Append a `losses.csv` row
    pub fn save_loss(&self, update: usize, gen_loss: f64) -> Result<()> {
        append_rows(&self.loss_log(), &[LossRow { update, gen_loss }])
    }

    /// Append one `levels.csv` row per level
    pub fn save_levels(
        &self,
        update: usize,
        levels: &[String],
        rewards: &[LevelReward],
        expected_rewards: &[f64],
    ) -> Result<()> {
        ensure!(
            levels.len() == rewards.len() && levels.len() == expected_rewards.len(),
            "got {} levels, {} rewards and {} expected rewards",
            levels.len(),
            rewards.len(),
            expected_rewards.len()
        );
        let rows: Vec<LevelRow> = levels
            .iter()
            .zip(rewards)
            .zip(expected_rewards)
            .map(|((level, &reward), &expected_reward)| LevelRow {
                update,
                level: level.clone(),
                reward,
                expected_reward,
            })
            .collect();
        append_rows(&self.levels_log(), &rows)
    }

    /// Critic value `[batch, 1]` of generated states
    ///
    /// Uses a zero recurrent state and marks every state as mid-episode.
    pub fn critic(&self, states: &Tensor) -> Tensor {
        let batch = states.size()[0];
        let device = states.device();
        let actor_critic = self.agent.actor_critic();
        let rnn_hxs = Tensor::zeros(
            [batch, actor_critic.recurrent_hidden_state_size()],
            (Kind::Float, device),
        );
        let masks = Tensor::ones([batch, 1], (Kind::Float, device));
        actor_critic.get_value(states, &rnn_hxs, &masks)
    }

    fn decode(&self, num: usize) -> Result<(Vec<String>, Tensor)> {
        let z = Tensor::rand([num as i64, self.generator.z_size()], (Kind::Float, self.config.device));
        let (levels, states) = self.generator.generate(&z);
        let ascii = self.definition.create_levels(&levels)?;
        ensure!(ascii.len() == num, "decoded {} levels, expected {}", ascii.len(), num);
        Ok((ascii, states))
    }

    fn write_level(&self, pool: &LevelPool, id: usize, state: &Tensor, ascii: &str) -> Result<()> {
        let passes = self.definition.pass_requirements(ascii);
        pool.write_level(id, state, ascii, passes)
    }

    /// Generate `num` fresh levels into slots `0..num` of the fresh pool
    ///
    /// The replay pool is left untouched, so rewards recorded for its slots
    /// keep describing the levels that earned them. Returns the ascii levels
    /// and their states `[num, c, h, w]`.
    pub fn new_levels(&self, num: usize) -> Result<(Vec<String>, Tensor)> {
        let (ascii, states) = self.decode(num)?;
        for (id, level) in ascii.iter().enumerate() {
            self.write_level(&self.fresh, id, &states.get(id as i64), level)?;
        }
        Ok((ascii, states))
    }

    /// Refresh pool slots `0..num`, keeping the best-rated stored levels
    ///
    /// Slots among the kept elites replay their stored level; every other
    /// slot is overwritten with a fresh one.
    pub fn new_elite_levels(&self, num: usize) -> Result<(Vec<String>, Tensor)> {
        let elite = self.pool.recompute()?;
        let ranked = match self.config.elite_keep {
            Some(keep) => elite.top(keep),
            None => elite.ids(),
        };
        let keep: HashSet<usize> = ranked.into_iter().filter(|&id| id < num).collect();

        let (mut ascii, fresh) = self.decode(num)?;
        let mut states = Vec::with_capacity(num);
        let mut kept = 0;
        for (id, level) in ascii.iter_mut().enumerate() {
            let fresh_state = fresh.get(id as i64);
            if keep.contains(&id) {
                match self.pool.read_level(id, self.config.device) {
                    Ok((state, stored)) => {
                        *level = stored;
                        states.push(state);
                        kept += 1;
                        continue;
                    }
                    Err(e) => tracing::warn!("regenerating elite level {}: {:#}", id, e),
                }
            }
            self.write_level(&self.pool, id, &fresh_state, level)?;
            states.push(fresh_state);
        }
        tracing::debug!(num, kept, ranked = elite.len(), "refreshed level pool");
        Ok((ascii, Tensor::stack(&states, 0)))
    }

    /// Generator gradient steps against the critic, returns the last loss
    fn update_generator(&mut self, batch_size: usize) -> Result<f64> {
        let device = self.config.device;
        let mut loss_value = f64::NAN;
        for step in 0..self.config.generator_steps {
            let z = Tensor::randn([batch_size as i64, self.generator.z_size()], (Kind::Float, device));
            let states = self.generator.adapter(&self.generator.forward(&z));
            let expected = self.critic(&states).view([-1]);
            let target = Tensor::full([batch_size as i64], self.config.target_value, (Kind::Float, device));
            let loss = expected.mse_loss(&target, Reduction::Mean);

            self.optimizer.zero_grad();
            loss.backward();
            self.optimizer.step();
            self.optimizer_steps += 1;

            loss_value = loss.double_value(&[]);
            if !loss_value.is_finite() {
                bail!("generator loss diverged at step {}", step);
            }
            if loss_value < self.config.loss_threshold {
                tracing::debug!(steps = step + 1, loss = loss_value, "generator reached target");
                break;
            }
        }
        Ok(loss_value)
    }

    /// Run `updates` co-training iterations
    ///
    /// Each iteration trains the agent for `burst_multiplier * rl_steps`
    /// steps, updates the generator on latent batches of `batch_size` and
    /// logs one freshly generated level.
    pub fn train(&mut self, updates: usize, batch_size: usize, rl_steps: usize) -> Result<()> {
        ensure!(batch_size > 0, "batch_size must be positive");

        self.agent.set_envs(None)?;
        if self.version == 0 {
            self.set_phase(Phase::ColdStart);
            self.agent.train_agent(self.config.pretrain_multiplier * rl_steps)?;
        }

        let mut loss_sum = 0.0;
        let mut since_checkpoint = 0;
        for _ in 0..updates {
            let update = self.version + 1;

            self.set_phase(Phase::AgentTraining);
            if let Some(pool_size) = self.config.pool_size {
                self.new_elite_levels(pool_size)?;
                let dir = self.pool.dir().to_path_buf();
                self.agent.set_envs(Some(&dir))?;
            }
            self.agent.train_agent(self.config.burst_multiplier * rl_steps)?;

            self.set_phase(Phase::GeneratorUpdate);
            let gen_loss = self.update_generator(batch_size)?;

            let (levels, states) = self.new_levels(1)?;
            let expected = tch::no_grad(|| self.critic(&states))
                .view([-1])
                .to_kind(Kind::Double)
                .to_device(Device::Cpu);
            let expected = Vec::<f64>::try_from(&expected)?;
            self.save_levels(update, &levels, &vec![LevelReward::Deferred; levels.len()], &expected)?;

            loss_sum += gen_loss;
            since_checkpoint += 1;
            self.version = update;

            if update % self.config.save_frequency == 0 {
                self.set_phase(Phase::Checkpoint);
                let mean_loss = loss_sum / since_checkpoint as f64;
                self.save_models(update, gen_loss)?;
                self.save_loss(update, mean_loss)?;
                tracing::info!(update, gen_loss = mean_loss, "checkpoint saved");
                loss_sum = 0.0;
                since_checkpoint = 0;
            }
        }

        self.agent.close_envs()?;
        self.set_phase(Phase::Done);
        Ok(())
    }
}

fn checkpoint_meta(named: &[(String, Tensor)], key: &str, path: &Path) -> Result<f64> {
    named
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, tensor)| tensor.double_value(&[0]))
        .ok_or_else(|| anyhow!("{} has no {}", path.display(), key))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{
        agent::ActorCritic,
        env::MazeDefinition,
        env::definition::MazeConfig,
        generator::{MlpGenerator, MlpGeneratorConfig},
    };

    /// Scores a state by its wall density
    struct WallCritic;

    impl ActorCritic for WallCritic {
        fn get_value(&self, state: &Tensor, rnn_hxs: &Tensor, masks: &Tensor) -> Tensor {
            assert_eq!(rnn_hxs.size(), vec![state.size()[0], 2]);
            assert_eq!(masks.double_value(&[0, 0]), 1.0);
            let cells: i64 = state.size()[2..].iter().product();
            state.narrow(1, 0, 1).flatten(1, -1).sum_dim_intlist(1, true, Kind::Float) / cells as f64
        }

        fn recurrent_hidden_state_size(&self) -> i64 {
            2
        }
    }

    #[derive(Default)]
    struct RecordingAgent {
        calls: RefCell<Vec<String>>,
    }

    impl RecordingAgent {
        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Agent for RecordingAgent {
        fn load(&mut self, dir: &Path, version: usize) -> Result<()> {
            let path = dir.join(format!("agent_{version}.txt"));
            ensure!(path.exists(), "no agent checkpoint {}", path.display());
            self.record(format!("load({version})"));
            Ok(())
        }

        fn save(&self, dir: &Path, version: usize) -> Result<()> {
            fs::write(dir.join(format!("agent_{version}.txt")), "agent")?;
            self.record(format!("save({version})"));
            Ok(())
        }

        fn set_envs(&mut self, pool: Option<&Path>) -> Result<()> {
            self.record(if pool.is_some() { "set_envs(pool)".into() } else { "set_envs".into() });
            Ok(())
        }

        fn train_agent(&mut self, step_budget: usize) -> Result<()> {
            self.record(format!("train({step_budget})"));
            Ok(())
        }

        fn play(&mut self, levels: &[String]) -> Result<Vec<f32>> {
            Ok(vec![0.0; levels.len()])
        }

        fn close_envs(&mut self) -> Result<()> {
            self.record("close".into());
            Ok(())
        }

        fn actor_critic(&self) -> &dyn ActorCritic {
            &WallCritic
        }
    }

    fn definition() -> Arc<dyn EnvDefinition> {
        Arc::new(MazeDefinition::new(MazeConfig::default()))
    }

    fn generator() -> MlpGenerator {
        MlpGenerator::new(MlpGeneratorConfig::new().z_size(8).hidden_dim(16), Device::Cpu).unwrap()
    }

    fn config(dir: &Path) -> TrainerConfig {
        TrainerConfig::new().save_dir(dir).budgets(3, 2).device(Device::Cpu)
    }

    fn trainer(config: TrainerConfig) -> CoTrainer<MlpGenerator, RecordingAgent> {
        CoTrainer::new(generator(), RecordingAgent::default(), definition(), config).unwrap()
    }

    fn csv_records(path: &Path) -> Vec<csv::StringRecord> {
        csv::Reader::from_path(path).unwrap().records().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_train_increments_version_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(config(dir.path()));
        assert_eq!(trainer.version(), 0);

        trainer.train(3, 4, 5).unwrap();
        assert_eq!(trainer.version(), 3);
        assert_eq!(trainer.phase(), Phase::Done);

        for version in 1..=3 {
            assert!(CoTrainer::<MlpGenerator, RecordingAgent>::checkpoint_path(
                &trainer.models_dir(),
                version
            )
            .exists());
            assert!(trainer.agents_dir().join(format!("agent_{version}.txt")).exists());
        }

        let losses = csv_records(&dir.path().join("losses.csv"));
        assert_eq!(losses.len(), 3);
        assert_eq!(&losses[2][0], "3");

        let levels = csv_records(&dir.path().join("levels.csv"));
        assert_eq!(levels.len(), 3);
        for (i, row) in levels.iter().enumerate() {
            assert_eq!(row[0].parse::<usize>().unwrap(), i + 1);
            assert_eq!(row[1].lines().count(), 7);
            assert_eq!(&row[2], "NaN");
            assert!(row[3].parse::<f64>().unwrap().is_finite());
        }
    }

    #[test]
    fn test_agent_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(config(dir.path()));
        trainer.train(2, 4, 5).unwrap();
        assert_eq!(
            trainer.agent().calls(),
            vec!["set_envs", "train(15)", "train(10)", "save(1)", "train(10)", "save(2)", "close"]
        );

        // no cold start once a version exists
        trainer.train(1, 4, 5).unwrap();
        assert_eq!(trainer.agent().calls()[7..], ["set_envs", "train(10)", "save(3)", "close"]);
        assert_eq!(trainer.version(), 3);
    }

    #[test]
    fn test_pool_refresh_points_agent_at_pool() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(config(dir.path()).pool_size(4));
        trainer.train(1, 4, 5).unwrap();
        assert_eq!(
            trainer.agent().calls(),
            vec!["set_envs", "train(15)", "set_envs(pool)", "train(10)", "save(1)", "close"]
        );
        assert_eq!(trainer.pool().level_ids().unwrap().len(), 4);
        assert_eq!(trainer.fresh_levels().level_ids().unwrap(), vec![0]);
    }

    #[test]
    fn test_loss_averaged_between_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(config(dir.path()).save_frequency(2));
        trainer.train(5, 4, 1).unwrap();
        assert_eq!(trainer.version(), 5);

        let losses = csv_records(&dir.path().join("losses.csv"));
        let updates: Vec<&str> = losses.iter().map(|row| row.get(0).unwrap()).collect();
        assert_eq!(updates, vec!["2", "4"]);
        assert!(!trainer.models_dir().join("checkpoint_1.ot").exists());
        assert!(trainer.models_dir().join("checkpoint_4.ot").exists());
        assert_eq!(csv_records(&dir.path().join("levels.csv")).len(), 5);
    }

    #[test]
    fn test_resume_restores_generator() {
        let dir = tempfile::tempdir().unwrap();
        let saved: Vec<(String, Tensor)> = {
            let mut trainer = trainer(config(dir.path()));
            trainer.train(2, 4, 1).unwrap();
            trainer
                .generator()
                .var_store()
                .variables()
                .into_iter()
                .map(|(name, tensor)| (name, tensor.copy()))
                .collect()
        };

        let resumed = trainer(config(dir.path()).resume_version(2));
        assert_eq!(resumed.version(), 2);
        assert_eq!(resumed.agent().calls(), vec!["load(2)"]);
        let variables = resumed.generator().var_store().variables();
        for (name, tensor) in &saved {
            assert!(variables[name].allclose(tensor, 1e-6, 1e-6, false), "{name} differs");
        }

        let missing = CoTrainer::new(
            generator(),
            RecordingAgent::default(),
            definition(),
            config(dir.path()).resume_version(5),
        );
        assert!(missing.is_err());
    }

    #[test]
    fn test_new_elite_levels_keeps_ranked_slots() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(config(dir.path()));
        let pool = trainer.pool();
        let (before, _) = trainer.new_elite_levels(4).unwrap();

        let marker = Tensor::zeros([5, 7, 11], (Kind::Float, Device::Cpu));
        pool.write_level(3, &marker, "custom", false).unwrap();
        pool.record_reward(0, 1, 5.0).unwrap();
        pool.record_reward(1, 3, 1.0).unwrap();

        let (after, states) = trainer.new_elite_levels(4).unwrap();
        assert_eq!(states.size(), vec![4, 5, 7, 11]);
        assert_eq!(after[1], before[1]);
        assert_eq!(after[3], "custom");
        assert_eq!(states.get(3).sum(Kind::Float).double_value(&[]), 0.0);
        assert!(!pool.is_compilable(3));
        assert!(pool.fragment_paths().unwrap().is_empty());
    }

    #[test]
    fn test_elite_keep_limits_kept_slots() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(config(dir.path()).elite_keep(1));
        let pool = trainer.pool();
        trainer.new_elite_levels(4).unwrap();

        let marker = Tensor::zeros([5, 7, 11], (Kind::Float, Device::Cpu));
        pool.write_level(3, &marker, "custom", false).unwrap();
        pool.record_reward(0, 1, 5.0).unwrap();
        pool.record_reward(0, 3, 1.0).unwrap();

        let (after, _) = trainer.new_elite_levels(4).unwrap();
        assert_ne!(after[3], "custom");
        assert_eq!(pool.read_ascii(3).unwrap(), after[3]);
    }

    #[test]
    fn test_new_levels_leave_replay_slots_alone() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(config(dir.path()));
        let pool = trainer.pool();
        trainer.new_elite_levels(4).unwrap();

        let played = Tensor::zeros([5, 7, 11], (Kind::Float, Device::Cpu));
        pool.write_level(0, &played, "played", false).unwrap();
        pool.record_reward(0, 0, 0.5).unwrap();

        let (logged, _) = trainer.new_levels(1).unwrap();
        assert_eq!(trainer.fresh_levels().read_ascii(0).unwrap(), logged[0]);
        assert_eq!(pool.read_ascii(0).unwrap(), "played");

        let (replayed, _) = trainer.new_elite_levels(4).unwrap();
        assert_eq!(replayed[0], "played");
        assert_eq!(trainer.pool().read_rankings().unwrap().ids(), vec![0]);
    }

    #[test]
    fn test_generator_steps_move_critic_towards_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer =
            trainer(config(dir.path()).learning_rate(0.05).loss_threshold(0.0).generator_steps(1));
        let first = trainer.update_generator(16).unwrap();

        trainer.config.generator_steps = 50;
        let last = trainer.update_generator(16).unwrap();
        assert_eq!(trainer.optimizer_steps, 51, "a zero threshold never stops early");
        assert!(last < first, "loss went from {first} to {last}");
    }

    #[test]
    fn test_generator_stops_at_loss_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer =
            trainer(config(dir.path()).learning_rate(0.05).loss_threshold(0.5).generator_steps(50));
        let loss = trainer.update_generator(16).unwrap();
        assert!(loss < 0.5);
        assert!(trainer.optimizer_steps < 50);
    }

    #[test]
    fn test_critic_scores_generated_states() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(config(dir.path()));
        let (_, states) = trainer.new_levels(3).unwrap();
        assert_eq!(trainer.critic(&states).size(), vec![3, 1]);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MlpGenerator::new(
            MlpGeneratorConfig::new().z_size(8).hidden_dim(16).state_shape([5, 9, 13]),
            Device::Cpu,
        )
        .unwrap();
        let result =
            CoTrainer::new(generator, RecordingAgent::default(), definition(), config(dir.path()));
        assert!(result.is_err());
    }
}
