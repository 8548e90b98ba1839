use outreach::{TaskId, TaskRequest};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

fn headless_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskRequest {
    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub identity: Option<String>,

    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub session_id: String,

    #[serde(default)]
    pub do_secondary_action: bool,

    #[serde(default)]
    pub action_message: Option<String>,

    #[serde(default = "headless_by_default")]
    pub run_headless: bool,
}

impl From<SubmitTaskRequest> for TaskRequest {
    fn from(request: SubmitTaskRequest) -> Self {
        TaskRequest {
            target: request.target,
            identity: request.identity,
            secret: request.secret,
            session_id: request.session_id,
            do_action: request.do_secondary_action,
            message: request.action_message,
            headless: request.run_headless,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskResponse {
    pub task_id: TaskId,
}

/// Many targets sharing one session and one set of options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitRequest {
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default)]
    pub identity: Option<String>,

    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub session_id: String,

    #[serde(default)]
    pub do_secondary_action: bool,

    #[serde(default)]
    pub action_message: Option<String>,

    #[serde(default = "headless_by_default")]
    pub run_headless: bool,
}

impl BatchSubmitRequest {
    pub fn requests(&self) -> impl Iterator<Item = TaskRequest> + '_ {
        self.targets.iter().map(|target| TaskRequest {
            target: target.clone(),
            identity: self.identity.clone(),
            secret: self.secret.clone(),
            session_id: self.session_id.clone(),
            do_action: self.do_secondary_action,
            message: self.action_message.clone(),
            headless: self.run_headless,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitResponse {
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============================================================================
// WebSocket Messages
// ============================================================================

/// Sent once when a listener joins, before any forwarded session event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    Joined {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}
