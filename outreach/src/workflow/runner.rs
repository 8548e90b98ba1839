use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{FailureReason, Outcome, Workflow};
use crate::config::WorkflowConfig;
use crate::engine::{AutomationEngine, SessionOptions};
use crate::events::EventSink;
use crate::fingerprint::FingerprintProvider;
use crate::queue::TaskExecutor;
use crate::task::Task;

/// Executes queued tasks: one fresh automation session per task, a workflow
/// bounded by the per-task ceiling, and the session always closed afterwards.
#[derive(Clone)]
pub struct WorkflowRunner {
    engine: Arc<dyn AutomationEngine>,
    fingerprints: Arc<dyn FingerprintProvider>,
    config: Arc<WorkflowConfig>,
}

impl WorkflowRunner {
    pub fn new(
        engine: Arc<dyn AutomationEngine>,
        fingerprints: Arc<dyn FingerprintProvider>,
        config: Arc<WorkflowConfig>,
    ) -> Self {
        Self {
            engine,
            fingerprints,
            config,
        }
    }
}

#[async_trait::async_trait]
impl TaskExecutor for WorkflowRunner {
    #[instrument(skip_all, fields(task_id = %task.id, target = %task.target))]
    async fn execute(&self, task: &Task, events: &dyn EventSink) -> Outcome {
        if task.cancel.is_cancelled() {
            info!("Task cancelled before it started");
            return Outcome::Failed(FailureReason::Cancelled);
        }

        let options = SessionOptions {
            url: task.target.to_string(),
            fingerprint: self.fingerprints.fingerprint(),
            headless: task.headless,
            navigation_timeout: self.config.timeouts.navigation(),
        };
        let opened = tokio::select! {
            biased;
            _ = task.cancel.cancelled() => return Outcome::Failed(FailureReason::Cancelled),
            opened = self.engine.open_session(options) => opened,
        };
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open automation session: {}", e);
                return Outcome::Failed(FailureReason::SessionStart(e.to_string()));
            }
        };

        let workflow = Workflow::new(task, &self.config, session.as_ref(), events);
        let ceiling = self.config.timeouts.task_timeout();
        let outcome = match tokio::time::timeout(ceiling, workflow.run()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(?ceiling, "Task exceeded its time ceiling");
                Outcome::Failed(FailureReason::TimedOut)
            }
        };

        // A session that died mid-task (e.g. on cancellation) must not change the outcome.
        if let Err(e) = session.close().await {
            warn!("Closing automation session failed: {}", e);
        }
        outcome
    }
}
