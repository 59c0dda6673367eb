//! Async task runner for dispatch jobs
//!
//! Jobs go onto a bounded queue. A single dispatcher task pulls them off
//! and runs each in its own task, with a semaphore capping how many run at
//! once and a timeout bounding each one. A failed, timed-out, or panicking
//! job is logged and counted; it never reaches the submitter or other jobs.
//! There is no ordering guarantee and no retry.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tpng_common::config::{DispatchConfig, QueueFullPolicy};
use tracing::{debug, error, info, warn};

use crate::dispatch::DispatchJob;
use crate::error::DispatchError;

/// Executes one job; implementations perform the actual I/O
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    async fn execute(&self, job: DispatchJob) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queue_full: QueueFullPolicy,
    pub job_timeout: Duration,
}

impl From<&DispatchConfig> for RunnerConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            queue_full: config.queue_full,
            job_timeout: Duration::from_secs(config.job_timeout_secs),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

#[derive(Debug, Default)]
struct RunnerCounters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    shed: AtomicU64,
}

/// Point-in-time runner counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunnerStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub shed: u64,
}

/// Result of handing a job to the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// Queue full under the `shed` policy
    Shed,
    /// Runner is shutting down
    Closed,
}

/// Cloneable submission handle
#[derive(Clone)]
pub struct TaskRunner {
    tx: mpsc::Sender<DispatchJob>,
    policy: QueueFullPolicy,
    counters: Arc<RunnerCounters>,
}

/// Owns the dispatcher task; used to shut the runner down
pub struct RunnerHandle {
    shutdown: CancellationToken,
    dispatcher: JoinHandle<()>,
}

impl TaskRunner {
    /// Start the dispatcher task
    pub fn start(config: RunnerConfig, executor: Arc<dyn JobExecutor>) -> (Self, RunnerHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(RunnerCounters::default());
        let shutdown = CancellationToken::new();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            policy = ?config.queue_full,
            timeout_secs = config.job_timeout.as_secs(),
            "Starting dispatch task runner"
        );

        let dispatcher = tokio::spawn(dispatch_loop(
            rx,
            executor,
            config.clone(),
            counters.clone(),
            shutdown.clone(),
        ));

        let runner = Self {
            tx,
            policy: config.queue_full,
            counters,
        };
        (runner, RunnerHandle { shutdown, dispatcher })
    }

    /// Queue a job according to the configured back-pressure policy
    pub async fn submit(&self, job: DispatchJob) -> SubmitOutcome {
        let outcome = match self.policy {
            QueueFullPolicy::Block => match self.tx.send(job).await {
                Ok(()) => SubmitOutcome::Queued,
                Err(_) => SubmitOutcome::Closed,
            },
            QueueFullPolicy::Shed => match self.tx.try_send(job) {
                Ok(()) => SubmitOutcome::Queued,
                Err(mpsc::error::TrySendError::Full(job)) => {
                    warn!(job = %job.describe(), "Dispatch queue full, shedding job");
                    self.counters.shed.fetch_add(1, Ordering::Relaxed);
                    SubmitOutcome::Shed
                }
                Err(mpsc::error::TrySendError::Closed(_)) => SubmitOutcome::Closed,
            },
        };

        match outcome {
            SubmitOutcome::Queued => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            SubmitOutcome::Closed => warn!("Dispatch runner is shut down, job dropped"),
            SubmitOutcome::Shed => {}
        }
        outcome
    }

    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            shed: self.counters.shed.load(Ordering::Relaxed),
        }
    }
}

impl RunnerHandle {
    /// Stop accepting jobs, run everything already queued, and wait for
    /// in-flight jobs to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.dispatcher.await {
            error!("Dispatch runner task failed: {}", e);
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<DispatchJob>,
    executor: Arc<dyn JobExecutor>,
    config: RunnerConfig,
    counters: Arc<RunnerCounters>,
    shutdown: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut in_flight = JoinSet::new();
    let mut closing = false;

    loop {
        let job = tokio::select! {
            job = rx.recv() => job,
            _ = shutdown.cancelled(), if !closing => {
                info!("Dispatch runner draining queue");
                rx.close();
                closing = true;
                continue;
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                record_panic(joined, &counters);
                continue;
            }
        };

        let Some(job) = job else {
            break;
        };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let executor = executor.clone();
        let counters = counters.clone();
        let timeout = config.job_timeout;
        in_flight.spawn(async move {
            let _permit = permit;
            let label = job.describe();
            debug!(job = %label, "Running dispatch job");

            match tokio::time::timeout(timeout, executor.execute(job)).await {
                Ok(Ok(())) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    error!(job = %label, error = %e, "Dispatch job failed");
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    error!(job = %label, timeout_secs = timeout.as_secs(), "Dispatch job timed out");
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        record_panic(joined, &counters);
    }
    info!("Dispatch runner stopped");
}

fn record_panic(joined: Result<(), tokio::task::JoinError>, counters: &RunnerCounters) {
    if let Err(e) = joined {
        error!("Dispatch job panicked: {}", e);
        counters.failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::BroadcastJob;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tpng_common::events::Room;
    use uuid::Uuid;

    fn job(event: &str) -> DispatchJob {
        DispatchJob::Broadcast(BroadcastJob {
            room: Room::System {
                system_id: Uuid::nil(),
            },
            event: event.to_string(),
            payload: json!(null),
        })
    }

    /// Behaves according to the event name of each job
    struct ScriptedExecutor {
        ran: AtomicUsize,
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl JobExecutor for ScriptedExecutor {
        async fn execute(&self, job: DispatchJob) -> Result<(), DispatchError> {
            let DispatchJob::Broadcast(job) = job else {
                return Ok(());
            };
            match job.event.as_str() {
                "fail" => return Err(DispatchError::Gateway("boom".to_string())),
                "panic" => panic!("job panicked"),
                "hang" => tokio::time::sleep(Duration::from_secs(3600)).await,
                "wait" => self.gate.notified().await,
                _ => {}
            }
            self.ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn executor() -> Arc<ScriptedExecutor> {
        Arc::new(ScriptedExecutor {
            ran: AtomicUsize::new(0),
            gate: Arc::new(tokio::sync::Notify::new()),
        })
    }

    fn config(policy: QueueFullPolicy, capacity: usize) -> RunnerConfig {
        RunnerConfig {
            workers: 2,
            queue_capacity: capacity,
            queue_full: policy,
            job_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_counted() {
        let exec = executor();
        let (runner, handle) = TaskRunner::start(config(QueueFullPolicy::Block, 16), exec.clone());

        for event in ["ok", "fail", "panic", "hang", "ok"] {
            assert_eq!(runner.submit(job(event)).await, SubmitOutcome::Queued);
        }
        handle.shutdown().await;

        let stats = runner.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 3);
        assert_eq!(exec.ran.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shed_policy_drops_when_full() {
        let exec = executor();
        let mut cfg = config(QueueFullPolicy::Shed, 1);
        cfg.workers = 1;
        cfg.job_timeout = Duration::from_secs(5);
        let (runner, handle) = TaskRunner::start(cfg, exec.clone());

        // Occupy the single worker, then fill the one queue slot
        runner.submit(job("wait")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(runner.submit(job("ok")).await);
        }
        assert!(outcomes.contains(&SubmitOutcome::Shed));

        exec.gate.notify_one();
        handle.shutdown().await;

        let stats = runner.stats();
        assert!(stats.shed >= 1);
        assert_eq!(stats.submitted + stats.shed, 5);
        assert_eq!(stats.succeeded, stats.submitted);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_closed() {
        let (runner, handle) = TaskRunner::start(config(QueueFullPolicy::Block, 4), executor());
        handle.shutdown().await;
        assert_eq!(runner.submit(job("ok")).await, SubmitOutcome::Closed);
    }
}
