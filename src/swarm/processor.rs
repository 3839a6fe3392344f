//! # SwarmTaskProcessor: decompose, fan out, aggregate.
//!
//! ```text
//! process(description, executor)
//!   ├─► TaskDecomposer::decompose ──► [Subtask; n] (Pending)
//!   ├─► JoinSet: one worker per subtask, all spawned together
//!   │     worker:
//!   │       ├─ acquire slot (Semaphore, max_parallel) or parent cancelled
//!   │       ├─ child token, optional timeout (cancels the child on expiry)
//!   │       ├─ executor.execute(ctx, id, description)   (direct, or via recovery)
//!   │       └─ panic caught ──► Failed
//!   ├─► join all; outcomes applied by index
//!   ├─► contributions over Completed subtasks
//!   └─► SwarmReport + history entry
//! ```
//!
//! ## Rules
//! - One failing, panicking or timed-out subtask never aborts its siblings.
//! - The call returns only after every subtask is terminal.
//! - Cancelling the caller's token fails subtasks that have not finished yet.
//! - A subtask counts as started only once it holds a slot: queued ones stay
//!   `Pending` with no `started_at` and publish no `SubtaskStarting`.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::SwarmConfig;
use crate::events::{Bus, Event, EventKind};
use crate::recovery::RecoveryOrchestrator;
use crate::swarm::decompose::TaskDecomposer;
use crate::swarm::executor::{Executor, ExecutorOperation, SubtaskCall};
use crate::swarm::report::{HistoryEntry, SwarmReport};
use crate::swarm::subtask::{SwarmStatus, SwarmTask};

struct Job {
    idx: usize,
    id: String,
    description: String,
}

struct Finished {
    idx: usize,
    started_at: Option<DateTime<Utc>>,
    outcome: Result<Value, String>,
}

/// Processes composite tasks with a caller-supplied [`Executor`].
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
/// use resilvisor::{ExecutorFn, OpError, SwarmConfig, SwarmTaskProcessor};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let processor = SwarmTaskProcessor::new(SwarmConfig::default());
/// let exec = ExecutorFn::arc("echo", |_ctx: CancellationToken, _id: String, desc: String| async move {
///     Ok::<_, OpError>(json!(desc))
/// });
///
/// let report = processor.process("Research caching. Build a prototype.", exec).await;
/// assert_eq!(report.completed_count, 2);
/// assert!((report.task.total_contribution - 1.0).abs() < 1e-6);
/// # }
/// ```
pub struct SwarmTaskProcessor {
    cfg: SwarmConfig,
    recovery: Option<Arc<RecoveryOrchestrator<Value>>>,
    history: Mutex<VecDeque<HistoryEntry>>,
    bus: Bus,
}

impl SwarmTaskProcessor {
    pub fn new(cfg: SwarmConfig) -> Self {
        Self {
            cfg,
            recovery: None,
            history: Mutex::new(VecDeque::new()),
            bus: Bus::default(),
        }
    }

    /// Routes every executor call through `recovery` (retries, circuit, no fallback).
    ///
    /// A subtask whose recovery yields nothing is marked failed.
    #[must_use]
    pub fn with_recovery(mut self, recovery: Arc<RecoveryOrchestrator<Value>>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Most recent processed tasks, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().iter().cloned().collect()
    }

    pub async fn process(&self, description: &str, executor: Arc<dyn Executor>) -> SwarmReport {
        self.process_with_token(description, executor, CancellationToken::new())
            .await
    }

    /// Like [`process`](Self::process); cancelling `token` fails every subtask
    /// still waiting or running.
    pub async fn process_with_token(
        &self,
        description: &str,
        executor: Arc<dyn Executor>,
        token: CancellationToken,
    ) -> SwarmReport {
        let task_id = format!("swarm-{}", uuid::Uuid::new_v4().simple());
        tracing::info!(task = %task_id, "starting swarm task");

        let subtasks = TaskDecomposer::decompose(&task_id, description);
        let mut task = SwarmTask::new(task_id, description, subtasks);

        self.run_all(&mut task, executor, &token).await;

        task.assign_contributions();
        task.status = SwarmStatus::Completed;
        task.completed_at = Some(Utc::now());

        let report = SwarmReport::from_task(task, self.cfg.preview_len);
        tracing::info!(
            task = %report.task_id,
            completed = report.completed_count,
            total = report.subtasks_count,
            "swarm task completed"
        );
        self.bus.publish(
            Event::new(EventKind::SwarmCompleted)
                .with_name(report.task_id.as_str())
                .with_reason(report.results.summary.as_str()),
        );
        self.remember(HistoryEntry::from(&report.task));
        report
    }

    async fn run_all(
        &self,
        task: &mut SwarmTask,
        executor: Arc<dyn Executor>,
        token: &CancellationToken,
    ) {
        let slots = self
            .cfg
            .concurrency_limit()
            .map(|n| Arc::new(Semaphore::new(n)));
        let mut set = JoinSet::new();

        for (idx, st) in task.subtasks.iter().enumerate() {
            let job = Job {
                idx,
                id: st.id.clone(),
                description: st.description.clone(),
            };
            let worker = Worker {
                executor: Arc::clone(&executor),
                recovery: self.recovery.clone(),
                slots: slots.clone(),
                timeout: self.cfg.timeout(),
                ctx: token.child_token(),
                bus: self.bus.clone(),
            };
            set.spawn(worker.run(job));
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(done) => {
                    let Some(st) = task.subtasks.get_mut(done.idx) else {
                        continue;
                    };
                    st.started_at = done.started_at;
                    match done.outcome {
                        Ok(value) => st.complete(value),
                        Err(error) => st.fail(error),
                    }
                }
                Err(e) => tracing::error!(error = %e, "swarm worker lost"),
            }
        }

        for st in task.subtasks.iter_mut().filter(|s| !s.status.is_terminal()) {
            st.fail("worker lost");
        }
    }

    fn remember(&self, entry: HistoryEntry) {
        let limit = self.cfg.history_limit;
        if limit == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= limit {
            history.pop_front();
        }
        history.push_back(entry);
    }
}

impl Default for SwarmTaskProcessor {
    fn default() -> Self {
        SwarmTaskProcessor::new(SwarmConfig::default())
    }
}

/// Everything one spawned subtask needs.
struct Worker {
    executor: Arc<dyn Executor>,
    recovery: Option<Arc<RecoveryOrchestrator<Value>>>,
    slots: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
    ctx: CancellationToken,
    bus: Bus,
}

impl Worker {
    async fn run(self, job: Job) -> Finished {
        let _slot = match &self.slots {
            Some(sem) => tokio::select! {
                biased;
                _ = self.ctx.cancelled() => {
                    return self.finish(job, None, Err("cancelled before start".to_string()));
                }
                permit = Arc::clone(sem).acquire_owned() => match permit {
                    Ok(p) => Some(p),
                    Err(_) => return self.finish(job, None, Err("worker pool closed".to_string())),
                },
            },
            None => None,
        };

        let started_at = Utc::now();
        tracing::debug!(subtask = %job.id, "subtask starting");
        self.bus
            .publish(Event::new(EventKind::SubtaskStarting).with_name(job.id.as_str()));

        let outcome = match AssertUnwindSafe(self.guarded(&job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(format!("subtask panicked: {}", panic_message(&*panic))),
        };
        self.finish(job, Some(started_at), outcome)
    }

    /// Executor call bounded by the timeout and by caller cancellation.
    async fn guarded(&self, job: &Job) -> Result<Value, String> {
        let call = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, self.call(job)).await {
                    Ok(res) => res,
                    Err(_elapsed) => {
                        self.ctx.cancel();
                        Err(format!("timed out after {limit:?}"))
                    }
                },
                None => self.call(job).await,
            }
        };

        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => Err("cancelled".to_string()),
            res = call => res,
        }
    }

    async fn call(&self, job: &Job) -> Result<Value, String> {
        match &self.recovery {
            Some(recovery) => {
                let op = ExecutorOperation {
                    executor: Arc::clone(&self.executor),
                    ctx: self.ctx.clone(),
                };
                let args = SubtaskCall {
                    id: job.id.clone(),
                    description: job.description.clone(),
                };
                recovery
                    .execute(&op, None, &args)
                    .await
                    .ok_or_else(|| "no result after recovery".to_string())
            }
            None => self
                .executor
                .execute(self.ctx.clone(), &job.id, &job.description)
                .await
                .map_err(|e| e.to_string()),
        }
    }

    fn finish(
        &self,
        job: Job,
        started_at: Option<DateTime<Utc>>,
        outcome: Result<Value, String>,
    ) -> Finished {
        match &outcome {
            Ok(_) => {
                tracing::info!(subtask = %job.id, "subtask completed");
                self.bus
                    .publish(Event::new(EventKind::SubtaskCompleted).with_name(job.id.as_str()));
            }
            Err(error) => {
                tracing::error!(subtask = %job.id, error = %error, "subtask failed");
                self.bus.publish(
                    Event::new(EventKind::SubtaskFailed)
                        .with_name(job.id.as_str())
                        .with_reason(error.as_str()),
                );
            }
        }
        Finished {
            idx: job.idx,
            started_at,
            outcome,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Processes `description` once with a throwaway processor.
pub async fn process_swarm_task(
    description: &str,
    executor: Arc<dyn Executor>,
    max_parallel: usize,
) -> SwarmReport {
    let processor = SwarmTaskProcessor::new(SwarmConfig {
        max_parallel,
        ..SwarmConfig::default()
    });
    processor.process(description, executor).await
}
