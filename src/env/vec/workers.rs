//! Vectorized environment backed by one worker thread per environment
//!
//! Each environment is constructed on its own thread and driven through a
//! command channel. A step broadcasts all actions before collecting any
//! replies, so environments advance concurrently.

use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow, ensure};
use crossbeam_channel::{Receiver, Sender};

use super::{EnvFactory, VecEnv, VecStepResult, step_auto_reset};
use crate::env::{Environment, SpaceInfo, StepResult};

enum Command {
    Reset,
    Step(i64),
    Close,
}

enum Reply {
    Ready { observation_space: SpaceInfo, action_space: SpaceInfo },
    Observation(Vec<f32>),
    Step(StepResult<Vec<f32>>),
    Failed(anyhow::Error),
}

struct Worker {
    commands: Sender<Command>,
    replies: Receiver<Reply>,
    handle: Option<JoinHandle<()>>,
}

/// Runs each environment on a dedicated thread
pub struct WorkerVecEnv {
    workers: Vec<Worker>,
    observation_space: SpaceInfo,
    action_space: SpaceInfo,
    closed: bool,
}

fn run_worker<E>(make: EnvFactory<E>, commands: Receiver<Command>, replies: Sender<Reply>)
where
    E: Environment<Observation = Vec<f32>, Action = i64>,
{
    let mut env = match make() {
        Ok(env) => env,
        Err(e) => {
            let _ = replies.send(Reply::Failed(e));
            return;
        }
    };
    let ready = Reply::Ready {
        observation_space: env.observation_space(),
        action_space: env.action_space(),
    };
    if replies.send(ready).is_err() {
        return;
    }

    for command in commands {
        let reply = match command {
            Command::Reset => env.reset().map(Reply::Observation),
            Command::Step(action) => step_auto_reset(&mut env, action).map(Reply::Step),
            Command::Close => break,
        };
        if replies.send(reply.unwrap_or_else(Reply::Failed)).is_err() {
            break;
        }
    }
}

impl WorkerVecEnv {
    /// Spawn one worker per factory and wait until every environment is built
    pub fn new<E>(factories: Vec<EnvFactory<E>>) -> Result<Self>
    where
        E: Environment<Observation = Vec<f32>, Action = i64> + 'static,
    {
        ensure!(!factories.is_empty(), "at least one environment is required");

        let mut workers = Vec::with_capacity(factories.len());
        for (rank, make) in factories.into_iter().enumerate() {
            let (command_tx, command_rx) = crossbeam_channel::bounded(1);
            let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
            let handle = thread::Builder::new()
                .name(format!("env-worker-{rank}"))
                .spawn(move || run_worker(make, command_rx, reply_tx))
                .with_context(|| format!("failed to spawn environment worker {rank}"))?;
            workers.push(Worker { commands: command_tx, replies: reply_rx, handle: Some(handle) });
        }

        let mut spaces = None;
        for (rank, worker) in workers.iter().enumerate() {
            match worker.replies.recv() {
                Ok(Reply::Ready { observation_space, action_space }) => {
                    if spaces.is_none() {
                        spaces = Some((observation_space, action_space));
                    }
                }
                Ok(Reply::Failed(e)) => {
                    return Err(e.context(format!("environment worker {rank} failed to start")));
                }
                Ok(_) => return Err(anyhow!("environment worker {rank} sent an unexpected reply")),
                Err(_) => return Err(anyhow!("environment worker {rank} exited during startup")),
            }
        }
        let (observation_space, action_space) =
            spaces.ok_or_else(|| anyhow!("no environment workers started"))?;

        tracing::debug!(workers = workers.len(), "started environment workers");
        Ok(Self { workers, observation_space, action_space, closed: false })
    }

    fn broadcast(&self, commands: impl Iterator<Item = Command>) -> Result<()> {
        for (rank, (worker, command)) in self.workers.iter().zip(commands).enumerate() {
            worker
                .commands
                .send(command)
                .map_err(|_| anyhow!("environment worker {rank} is gone"))?;
        }
        Ok(())
    }

    /// Collect one reply per worker, draining every channel even on failure
    fn collect(&self) -> Result<Vec<Reply>> {
        let mut replies = Vec::with_capacity(self.workers.len());
        let mut failures = Vec::new();
        for (rank, worker) in self.workers.iter().enumerate() {
            match worker.replies.recv() {
                Ok(Reply::Failed(e)) => {
                    failures.push(e.context(format!("environment worker {rank} failed")));
                }
                Ok(reply) => replies.push(reply),
                Err(_) => failures.push(anyhow!("environment worker {rank} exited unexpectedly")),
            }
        }
        match failures.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }
}

impl VecEnv for WorkerVecEnv {
    fn num_envs(&self) -> usize {
        self.workers.len()
    }

    fn observation_space(&self) -> SpaceInfo {
        self.observation_space.clone()
    }

    fn action_space(&self) -> SpaceInfo {
        self.action_space.clone()
    }

    fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        ensure!(!self.closed, "environment workers are closed");
        self.broadcast(std::iter::repeat_with(|| Command::Reset))?;
        self.collect()?
            .into_iter()
            .map(|reply| match reply {
                Reply::Observation(obs) => Ok(obs),
                _ => Err(anyhow!("expected an observation from environment worker")),
            })
            .collect()
    }

    fn step(&mut self, actions: &[i64]) -> Result<VecStepResult> {
        ensure!(!self.closed, "environment workers are closed");
        ensure!(
            actions.len() == self.workers.len(),
            "expected {} actions, got {}",
            self.workers.len(),
            actions.len()
        );
        self.broadcast(actions.iter().map(|&action| Command::Step(action)))?;
        let results = self
            .collect()?
            .into_iter()
            .map(|reply| match reply {
                Reply::Step(result) => Ok(result),
                _ => Err(anyhow!("expected a step result from environment worker")),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(VecStepResult::from_results(results))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for worker in &self.workers {
            // a worker that already exited has dropped its receiver
            let _ = worker.commands.send(Command::Close);
        }
        let mut panicked = 0;
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    panicked += 1;
                }
            }
        }
        ensure!(panicked == 0, "{panicked} environment workers panicked");
        Ok(())
    }
}

impl Drop for WorkerVecEnv {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("error while closing environment workers: {:#}", e);
        }
    }
}
