//! FIFO task queue with a hard cap on concurrently running workflows.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cancellation::SessionCancellation;
use crate::config::QueueConfig;
use crate::errors::SubmissionError;
use crate::events::{EventSink, SessionEvent, TaskResult};
use crate::task::{Task, TaskId};
use crate::workflow::{FailureReason, Outcome};

/// Runs one task to its terminal outcome. Must not panic; if it does, the
/// task still settles as failed.
#[async_trait::async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, events: &dyn EventSink) -> Outcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub pending: usize,
    pub running: usize,
    pub max_concurrent: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Task>,
    running: HashMap<TaskId, Task>,
}

/// Long-lived scheduler shared by request handlers.
///
/// The state mutex is the admission guard: moving tasks from `pending` to
/// `running` happens entirely under it, so concurrent admission passes can
/// never overshoot `max_concurrent`.
pub struct Scheduler {
    state: Mutex<QueueState>,
    max_concurrent: usize,
    max_pending: Option<usize>,
    executor: Arc<dyn TaskExecutor>,
    events: Arc<dyn EventSink>,
    cancellation: Option<SessionCancellation>,
}

impl Scheduler {
    pub fn new(
        config: &QueueConfig,
        executor: Arc<dyn TaskExecutor>,
        events: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Self::build(config, executor, events, None)
    }

    /// Like [`new`](Self::new), releasing each task's session token once the task
    /// is rejected or settles.
    pub fn with_cancellation(
        config: &QueueConfig,
        executor: Arc<dyn TaskExecutor>,
        events: Arc<dyn EventSink>,
        cancellation: SessionCancellation,
    ) -> Arc<Self> {
        Self::build(config, executor, events, Some(cancellation))
    }

    fn build(
        config: &QueueConfig,
        executor: Arc<dyn TaskExecutor>,
        events: Arc<dyn EventSink>,
        cancellation: Option<SessionCancellation>,
    ) -> Arc<Self> {
        info!(
            max_concurrent = config.max_concurrent,
            max_pending = ?config.max_pending,
            "Scheduler ready"
        );
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            max_concurrent: config.max_concurrent.max(1),
            max_pending: config.max_pending,
            executor,
            events,
            cancellation,
        })
    }

    /// Enqueue a task and return its id without waiting for it to run.
    pub async fn submit(self: &Arc<Self>, task: Task) -> Result<TaskId, SubmissionError> {
        let task_id = task.id;
        self.submit_all(vec![task]).await?;
        Ok(task_id)
    }

    /// Enqueue a batch as one unit: either every task fits under the pending
    /// cap and is queued in order, or none is.
    pub async fn submit_all(self: &Arc<Self>, tasks: Vec<Task>) -> Result<Vec<TaskId>, SubmissionError> {
        let mut state = self.state.lock().await;
        if let Some(limit) = self.max_pending {
            if state.pending.len() + tasks.len() > limit {
                warn!(
                    batch = tasks.len(),
                    pending = state.pending.len(),
                    limit,
                    "Queue full, rejecting submission"
                );
                drop(state);
                for task in &tasks {
                    self.release(task).await;
                }
                return Err(SubmissionError::QueueFull(limit));
            }
        }

        let mut task_ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            let task_id = task.id;
            let event = SessionEvent::Queued {
                task_id,
                target: task.target.to_string(),
                position: state.pending.len() + 1,
            };
            let session_id = task.session_id.clone();
            state.pending.push_back(task);
            // Published under the guard so it always precedes the task's `started` event.
            self.events.publish(&session_id, event).await;
            debug!(%task_id, pending = state.pending.len(), "Task queued");
            task_ids.push(task_id);
        }
        drop(state);

        self.schedule_admission();
        Ok(task_ids)
    }

    /// Snapshot of the queue counters.
    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            pending: state.pending.len(),
            running: state.running.len(),
            max_concurrent: self.max_concurrent,
        }
    }

    pub async fn is_idle(&self) -> bool {
        let state = self.state.lock().await;
        state.pending.is_empty() && state.running.is_empty()
    }

    fn schedule_admission(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.admit().await });
    }

    /// Move tasks from pending to running while slots are free, then start them.
    async fn admit(self: &Arc<Self>) {
        let admitted: Vec<Task> = {
            let mut state = self.state.lock().await;
            let mut admitted = Vec::new();
            while state.running.len() < self.max_concurrent {
                let Some(task) = state.pending.pop_front() else {
                    break;
                };
                state.running.insert(task.id, task.clone());
                admitted.push(task);
            }
            if !admitted.is_empty() {
                debug!(
                    admitted = admitted.len(),
                    running = state.running.len(),
                    pending = state.pending.len(),
                    "Admission pass"
                );
            }
            admitted
        };

        for task in admitted {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move { scheduler.run_task(task).await });
        }
    }

    async fn run_task(self: Arc<Self>, task: Task) {
        let task_id = task.id;
        let target = task.target.to_string();
        info!(%task_id, %target, "🚀 Task started");
        self.events
            .publish(
                &task.session_id,
                SessionEvent::Started {
                    task_id,
                    target: target.clone(),
                },
            )
            .await;

        let executor = Arc::clone(&self.executor);
        let events = Arc::clone(&self.events);
        let job = task.clone();
        let outcome = match tokio::spawn(async move { executor.execute(&job, events.as_ref()).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%task_id, "Workflow aborted: {}", e);
                Outcome::Failed(FailureReason::Automation(format!("workflow aborted: {e}")))
            }
        };

        self.release(&task).await;
        let removed = self.state.lock().await.running.remove(&task_id).is_some();
        if !removed {
            error!(%task_id, "Settled task was not in the running set");
        }

        info!(%task_id, %target, outcome = ?outcome.kind(), "🏁 Task settled");
        self.events
            .publish(
                &task.session_id,
                SessionEvent::Result(TaskResult {
                    task_id,
                    target,
                    success: !outcome.is_failure(),
                    outcome: outcome.kind(),
                    error: outcome.error(),
                }),
            )
            .await;

        self.schedule_admission();
    }

    async fn release(&self, task: &Task) {
        if let Some(cancellation) = &self.cancellation {
            cancellation.release(&task.session_id, &task.cancel).await;
        }
    }
}
