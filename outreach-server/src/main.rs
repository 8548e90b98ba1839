mod api;
mod state;
#[cfg(test)]
mod tests;
mod types;
mod websocket;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use outreach::{CdpEngine, OutreachConfig, SessionCancellation, UserAgentPool, WorkflowRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "outreach-server")]
#[command(about = "HTTP/WebSocket server that queues and runs browser outreach tasks")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "OUTREACH_PORT", default_value = "8083")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "OUTREACH_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Workflows allowed to run at once (overrides the config file)
    #[arg(long, env = "OUTREACH_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// Reject submissions beyond this many waiting tasks
    #[arg(long, env = "OUTREACH_MAX_PENDING")]
    max_pending: Option<usize>,

    /// Ceiling on a single task's run time, in seconds
    #[arg(long, env = "OUTREACH_TASK_TIMEOUT_SECS")]
    task_timeout_secs: Option<u64>,

    /// Enable CORS for all origins
    #[arg(long, env = "OUTREACH_CORS")]
    cors: bool,

    /// Chromium-family browser to launch (auto-detected when omitted)
    #[arg(long, env = "OUTREACH_CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// YAML file with timeouts, page vocabularies and locator candidates
    #[arg(long, env = "OUTREACH_CONFIG")]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<OutreachConfig> {
    let mut config = match &args.config {
        Some(path) => OutreachConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => OutreachConfig::default(),
    };

    if let Some(max_concurrent) = args.max_concurrent {
        config.queue.max_concurrent = max_concurrent;
    }
    if args.max_pending.is_some() {
        config.queue.max_pending = args.max_pending;
    }
    if let Some(secs) = args.task_timeout_secs {
        config.workflow.timeouts.task_timeout_ms = secs.saturating_mul(1000);
    }
    config.validate()?;
    Ok(config)
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(api::health))
        // Task submission
        .route("/api/tasks", post(api::submit_task))
        .route("/api/tasks/batch", post(api::submit_batch))
        .route("/api/queue/status", get(api::queue_status))
        // Session channel
        .route("/api/sessions/events", get(websocket::websocket_handler))
        .route("/api/sessions/{session_id}/cancel", post(api::cancel_session))
        .with_state(state)
}

async fn shutdown_signal(cancellation: SessionCancellation) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutting down, cancelling outstanding tasks");
    cancellation.cancel_all().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("🚀 Starting outreach-server v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    info!("🔧 Max concurrent: {}", config.queue.max_concurrent);
    info!("🔧 Max pending: {:?}", config.queue.max_pending);
    info!("🔧 Task timeout: {:?}", config.workflow.timeouts.task_timeout());
    info!("🔧 CORS: {}", if args.cors { "enabled" } else { "disabled" });

    let engine = Arc::new(CdpEngine::new(args.chrome_path.clone()));
    let runner = WorkflowRunner::new(
        engine,
        Arc::new(UserAgentPool::default()),
        Arc::new(config.workflow.clone()),
    );
    let state = Arc::new(AppState::new(&config.queue, Arc::new(runner)));
    let cancellation = state.cancellation.clone();

    info!("✅ Scheduler initialized");

    let mut router = app(state);
    if args.cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("✅ Server listening on http://{}", addr);
    info!("📡 WebSocket endpoint: ws://{}/api/sessions/events?session=<id>", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(cancellation))
        .await?;

    info!("👋 Server stopped");
    Ok(())
}
