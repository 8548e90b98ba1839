use std::sync::Arc;

use outreach::{QueueConfig, Scheduler, SessionCancellation, SessionHub, TaskExecutor};

/// Everything the handlers share. Built once in `main` and handed to axum.
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub hub: Arc<SessionHub>,
    pub cancellation: SessionCancellation,
}

impl AppState {
    pub fn new(queue: &QueueConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        let hub = Arc::new(SessionHub::new());
        let cancellation = SessionCancellation::new();
        let scheduler = Scheduler::with_cancellation(queue, executor, hub.clone(), cancellation.clone());
        Self {
            scheduler,
            hub,
            cancellation,
        }
    }
}
