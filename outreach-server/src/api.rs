use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use outreach::{QueueStatus, SubmissionError, Task, TaskRequest};
use std::sync::Arc;
use tracing::{info, warn};

use crate::state::AppState;
use crate::types::{
    BatchSubmitRequest, BatchSubmitResponse, CancelResponse, HealthResponse, SubmitTaskRequest,
    SubmitTaskResponse,
};

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    QueueFull(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::QueueFull(message) => (StatusCode::TOO_MANY_REQUESTS, message),
        };
        (
            status,
            Json(serde_json::json!({
                "error": message
            })),
        )
            .into_response()
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::QueueFull(_) => ApiError::QueueFull(err.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Task Submission
// ============================================================================

async fn validate(state: &AppState, request: TaskRequest) -> Result<Task, SubmissionError> {
    // A rejected request must not mint a session token.
    outreach::task::parse_target(&request.target)?;
    if request.session_id.trim().is_empty() {
        return Err(SubmissionError::MissingSessionId);
    }
    let token = state.cancellation.token_for(request.session_id.trim()).await;
    Task::new(request, token)
}

pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    let Json(request) = payload?;
    info!("📥 POST /api/tasks - session: {}", request.session_id);

    let task = validate(&state, request.into()).await.map_err(|e| {
        warn!("⚠️ Rejected task: {}", e);
        ApiError::from(e)
    })?;
    let task_id = state.scheduler.submit(task).await?;

    info!("✅ Task accepted: {}", task_id);
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { task_id })))
}

pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchSubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchSubmitResponse>), ApiError> {
    let Json(batch) = payload?;
    info!(
        "📥 POST /api/tasks/batch - session: {}, targets: {}",
        batch.session_id,
        batch.targets.len()
    );

    if batch.targets.is_empty() {
        return Err(ApiError::BadRequest("targets must not be empty".to_string()));
    }

    // Every target is checked before any task is enqueued.
    let mut tasks = Vec::with_capacity(batch.targets.len());
    for request in batch.requests() {
        match validate(&state, request).await {
            Ok(task) => tasks.push(task),
            Err(e) => {
                for task in &tasks {
                    state.cancellation.release(&task.session_id, &task.cancel).await;
                }
                warn!("⚠️ Rejected batch: {}", e);
                return Err(e.into());
            }
        }
    }

    let task_ids = state.scheduler.submit_all(tasks).await?;

    info!("✅ Batch accepted: {} tasks", task_ids.len());
    Ok((StatusCode::ACCEPTED, Json(BatchSubmitResponse { task_ids })))
}

// ============================================================================
// Queue Status
// ============================================================================

pub async fn queue_status(State(state): State<Arc<AppState>>) -> Json<QueueStatus> {
    Json(state.scheduler.status().await)
}

// ============================================================================
// Session Cancellation
// ============================================================================

pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<CancelResponse> {
    info!("📥 POST /api/sessions/{}/cancel", session_id);
    let cancelled = state.cancellation.cancel(&session_id).await;
    if cancelled {
        info!("🛑 Session cancelled: {}", session_id);
    }
    Json(CancelResponse { cancelled })
}
