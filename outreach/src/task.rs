use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::errors::SubmissionError;

pub type TaskId = Uuid;

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionFlags {
    /// Run the connect sub-flow. When false the workflow only visits and classifies.
    pub do_action: bool,
    /// Optional note entered before the final confirmation.
    pub message: Option<String>,
}

/// Unvalidated submission, as received from a client.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub target: String,
    pub identity: Option<String>,
    pub secret: Option<String>,
    pub session_id: String,
    pub do_action: bool,
    pub message: Option<String>,
    pub headless: bool,
}

/// A validated unit of work. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub target: Url,
    pub credentials: Option<Credentials>,
    pub session_id: String,
    pub action: ActionFlags,
    pub headless: bool,
    pub created_at: DateTime<Utc>,
    /// Shared with every task of the same batch.
    pub cancel: CancellationToken,
}

impl Task {
    pub fn new(request: TaskRequest, cancel: CancellationToken) -> Result<Self, SubmissionError> {
        let target = parse_target(&request.target)?;

        let session_id = request.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(SubmissionError::MissingSessionId);
        }

        let credentials = match (non_empty(request.identity), non_empty(request.secret)) {
            (Some(identity), Some(secret)) => Some(Credentials { identity, secret }),
            _ => None,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            target,
            credentials,
            session_id,
            action: ActionFlags {
                do_action: request.do_action,
                message: non_empty(request.message),
            },
            headless: request.headless,
            created_at: Utc::now(),
            cancel,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_target(raw: &str) -> Result<Url, SubmissionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SubmissionError::InvalidTarget("target is empty".to_string()));
    }
    let url = Url::parse(raw).map_err(|e| SubmissionError::InvalidTarget(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SubmissionError::InvalidTarget(format!(
            "{raw}: unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(SubmissionError::InvalidTarget(format!("{raw}: missing host")));
    }
    Ok(url)
}

/// The target page rebuilt from scheme, host and path; query and fragment dropped.
pub fn canonical_target(target: &Url) -> Url {
    let mut canonical = target.clone();
    canonical.set_query(None);
    canonical.set_fragment(None);
    let trimmed = canonical.path().trim_end_matches('/').to_string();
    canonical.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    canonical
}

fn bare_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// Whether `current` already shows the target's host and page.
pub fn is_on_target(current: &str, target: &Url) -> bool {
    let Ok(current) = Url::parse(current) else {
        return false;
    };
    let canonical = canonical_target(target);
    if bare_host(&current) != bare_host(&canonical) {
        return false;
    }
    let wanted = canonical.path().trim_end_matches('/');
    let path = current.path().trim_end_matches('/');
    // Sub-pages count, sibling paths sharing a prefix do not.
    path == wanted || path.starts_with(&format!("{wanted}/"))
}
