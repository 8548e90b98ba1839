use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct SessionEntry {
    token: CancellationToken,
    /// Tasks handed this token that have not settled yet.
    live: usize,
}

/// Cancellation tokens keyed by client session.
///
/// Every task submitted under a session shares that session's token, so one
/// cancel stops the whole batch. Cancelling retires the token: tasks submitted
/// afterwards get a fresh one and run normally. A session whose last task has
/// been released is forgotten.
#[derive(Clone, Default)]
pub struct SessionCancellation {
    tokens: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for the next task of `session_id`. Pair every call with [`release`](Self::release).
    pub async fn token_for(&self, session_id: &str) -> CancellationToken {
        let mut tokens = self.tokens.write().await;
        let entry = tokens
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                token: CancellationToken::new(),
                live: 0,
            });
        entry.live += 1;
        entry.token.clone()
    }

    /// The task holding `token` has settled or was never enqueued.
    pub async fn release(&self, session_id: &str, token: &CancellationToken) {
        // A cancelled token belongs to an entry that `cancel` already removed.
        if token.is_cancelled() {
            return;
        }
        let mut tokens = self.tokens.write().await;
        let Some(entry) = tokens.get_mut(session_id) else {
            return;
        };
        entry.live = entry.live.saturating_sub(1);
        if entry.live == 0 {
            tokens.remove(session_id);
            debug!(session_id, "Session has no live tasks, token retired");
        }
    }

    /// Cancel every task handed a token for this session. Returns false if none were.
    pub async fn cancel(&self, session_id: &str) -> bool {
        match self.tokens.write().await.remove(session_id) {
            Some(entry) => {
                info!(session_id, live = entry.live, "Cancelling session tasks");
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) {
        let mut tokens = self.tokens.write().await;
        for (session_id, entry) in tokens.drain() {
            info!(session_id, "Cancelling session tasks during shutdown");
            entry.token.cancel();
        }
    }

    pub async fn session_count(&self) -> usize {
        self.tokens.read().await.len()
    }
}
