//! Per-session publish/subscribe channel for progress and result events.
//!
//! Delivery is best-effort: events published to a session with no listener are
//! dropped, never buffered. Joining is unauthenticated; anyone holding a
//! session id can listen to it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::task::TaskId;
use crate::workflow::{OutcomeKind, WorkflowState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    Queued {
        task_id: TaskId,
        target: String,
        position: usize,
    },
    Started {
        task_id: TaskId,
        target: String,
    },
    Progress {
        task_id: TaskId,
        target: String,
        state: WorkflowState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Result(TaskResult),
}

/// Final report for one task, delivered exactly once per settled task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: TaskId,
    pub target: String,
    pub success: bool,
    pub outcome: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where the workflow and scheduler send events. Transport-agnostic.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, session_id: &str, event: SessionEvent);
}

pub type ListenerId = u64;

/// A listener's membership in a session plus its event stream.
#[derive(Debug)]
pub struct Subscription {
    pub session_id: String,
    pub listener_id: ListenerId,
    pub receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

type Listeners = HashMap<ListenerId, mpsc::UnboundedSender<SessionEvent>>;

/// In-process session registry fanning events out to every joined listener.
#[derive(Default)]
pub struct SessionHub {
    sessions: RwLock<HashMap<String, Listeners>>,
    next_listener: AtomicU64,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, session_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener_id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert(listener_id, tx);
        debug!(session_id, listener_id, "Listener joined");
        Subscription {
            session_id: session_id.to_string(),
            listener_id,
            receiver: rx,
        }
    }

    /// Remove a listener. Returns false if it was not joined.
    pub async fn leave(&self, session_id: &str, listener_id: ListenerId) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(listeners) = sessions.get_mut(session_id) else {
            return false;
        };
        let removed = listeners.remove(&listener_id).is_some();
        if listeners.is_empty() {
            sessions.remove(session_id);
        }
        debug!(session_id, listener_id, removed, "Listener left");
        removed
    }

    pub async fn listener_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl EventSink for SessionHub {
    async fn publish(&self, session_id: &str, event: SessionEvent) {
        let closed: Vec<ListenerId> = {
            let sessions = self.sessions.read().await;
            let Some(listeners) = sessions.get(session_id) else {
                debug!(session_id, "No listeners, dropping event");
                return;
            };
            listeners
                .iter()
                .filter(|(_, tx)| tx.send(event.clone()).is_err())
                .map(|(id, _)| *id)
                .collect()
        };

        for listener_id in closed {
            self.leave(session_id, listener_id).await;
        }
    }
}
