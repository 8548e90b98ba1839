use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use outreach::{
    EventSink, FailureReason, Outcome, OutcomeKind, QueueConfig, SessionEvent, Subscription, Task,
    TaskExecutor,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::app;
use crate::state::AppState;

/// Targets under `/slow/` wait for cancellation; everything else is already pending.
struct StubExecutor;

#[async_trait::async_trait]
impl TaskExecutor for StubExecutor {
    async fn execute(&self, task: &Task, _events: &dyn EventSink) -> Outcome {
        if task.target.path().starts_with("/slow/") {
            task.cancel.cancelled().await;
            return Outcome::Failed(FailureReason::Cancelled);
        }
        Outcome::AlreadyPending
    }
}

fn state(max_concurrent: usize, max_pending: Option<usize>) -> Arc<AppState> {
    let queue = QueueConfig {
        max_concurrent,
        max_pending,
    };
    Arc::new(AppState::new(&queue, Arc::new(StubExecutor)))
}

async fn call(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

fn submission(target: &str, session: &str) -> Value {
    json!({
        "target": target,
        "sessionId": session,
        "doSecondaryAction": true,
        "runHeadless": true
    })
}

async fn next_result(subscription: &mut Subscription) -> outreach::TaskResult {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), subscription.receiver.recv())
            .await
            .expect("no event within 5s")
            .expect("channel closed");
        if let SessionEvent::Result(result) = event {
            return result;
        }
    }
}

#[tokio::test]
async fn health_reports_version() {
    let (status, body) = call(app(state(1, None)), "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn submit_returns_task_id_and_result_reaches_the_session() {
    let state = state(2, None);
    let mut listener = state.hub.join("dash-1").await;

    let (status, body) = call(
        app(state.clone()),
        "POST",
        "/api/tasks",
        Some(submission("https://example.test/user/abc", "dash-1")),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["taskId"].as_str().unwrap().to_string();

    let result = next_result(&mut listener).await;
    assert_eq!(result.task_id.to_string(), task_id);
    assert_eq!(result.outcome, OutcomeKind::AlreadyPending);
    assert!(result.success);
}

#[tokio::test]
async fn bad_submissions_are_rejected_with_400() {
    let state = state(1, None);

    let (status, body) = call(
        app(state.clone()),
        "POST",
        "/api/tasks",
        Some(submission("not a url", "dash-1")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid target"), "{body}");

    let (status, body) = call(
        app(state.clone()),
        "POST",
        "/api/tasks",
        Some(json!({ "target": "https://example.test/user/abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing session id");

    let request = Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was enqueued and no session token was minted.
    assert_eq!(state.scheduler.status().await.pending, 0);
    assert_eq!(state.cancellation.session_count().await, 0);
}

#[tokio::test]
async fn full_queue_answers_429_and_status_reflects_it() {
    let state = state(1, Some(1));

    for n in 0..2 {
        let (status, _) = call(
            app(state.clone()),
            "POST",
            "/api/tasks",
            Some(submission(&format!("https://example.test/slow/{n}"), "dash-1")),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        // Let the first task be admitted before the next submission.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (status, body) = call(
        app(state.clone()),
        "POST",
        "/api/tasks",
        Some(submission("https://example.test/slow/2", "dash-1")),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("Queue is full"));

    let (status, body) = call(app(state.clone()), "GET", "/api/queue/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "pending": 1, "running": 1, "maxConcurrent": 1 }));

    state.cancellation.cancel_all().await;
}

#[tokio::test]
async fn batch_with_one_bad_target_enqueues_nothing() {
    let state = state(2, None);
    let (status, body) = call(
        app(state.clone()),
        "POST",
        "/api/tasks/batch",
        Some(json!({
            "sessionId": "dash-1",
            "targets": ["https://example.test/user/a", "ftp://example.test/user/b"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unsupported scheme"), "{body}");
    let status = state.scheduler.status().await;
    assert_eq!((status.pending, status.running), (0, 0));
}

#[tokio::test]
async fn batch_over_the_cap_is_rejected_whole() {
    let state = state(1, Some(2));

    let (status, _) = call(
        app(state.clone()),
        "POST",
        "/api/tasks",
        Some(submission("https://example.test/slow/0", "dash-1")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let (status, _) = call(
        app(state.clone()),
        "POST",
        "/api/tasks",
        Some(submission("https://example.test/slow/1", "dash-1")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = call(
        app(state.clone()),
        "POST",
        "/api/tasks/batch",
        Some(json!({
            "sessionId": "dash-2",
            "targets": ["https://example.test/user/a", "https://example.test/user/b"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("Queue is full"), "{body}");

    let queue = state.scheduler.status().await;
    assert_eq!((queue.pending, queue.running), (1, 1));
    // The rejected batch's session holds no token.
    assert_eq!(state.cancellation.session_count().await, 1);

    state.cancellation.cancel_all().await;
}

#[tokio::test]
async fn finished_sessions_are_forgotten() {
    let state = state(2, None);
    let mut listener = state.hub.join("dash-1").await;

    let (status, _) = call(
        app(state.clone()),
        "POST",
        "/api/tasks/batch",
        Some(json!({
            "sessionId": "dash-1",
            "targets": ["https://example.test/user/a", "https://example.test/user/b"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    next_result(&mut listener).await;
    next_result(&mut listener).await;
    while !state.scheduler.is_idle().await {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(state.cancellation.session_count().await, 0);
}

#[tokio::test]
async fn batch_returns_ids_in_submission_order() {
    let state = state(1, None);
    let mut listener = state.hub.join("dash-1").await;

    let (status, body) = call(
        app(state.clone()),
        "POST",
        "/api/tasks/batch",
        Some(json!({
            "sessionId": "dash-1",
            "doSecondaryAction": true,
            "targets": ["https://example.test/user/a", "https://example.test/user/b"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let ids: Vec<String> = body["taskIds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 2);

    let first = next_result(&mut listener).await;
    let second = next_result(&mut listener).await;
    assert_eq!(first.task_id.to_string(), ids[0]);
    assert_eq!(second.task_id.to_string(), ids[1]);
}

#[tokio::test]
async fn cancelling_a_session_fails_its_tasks() {
    let state = state(1, None);
    let mut listener = state.hub.join("dash-1").await;

    for n in 0..2 {
        let (status, _) = call(
            app(state.clone()),
            "POST",
            "/api/tasks",
            Some(submission(&format!("https://example.test/slow/{n}"), "dash-1")),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let (status, body) = call(app(state.clone()), "POST", "/api/sessions/dash-1/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "cancelled": true }));

    for _ in 0..2 {
        let result = next_result(&mut listener).await;
        assert!(!result.success);
        assert_eq!(result.outcome, OutcomeKind::Failed);
    }

    let (_, body) = call(app(state.clone()), "POST", "/api/sessions/dash-1/cancel", None).await;
    assert_eq!(body, json!({ "cancelled": false }));
}
