//! Webhook listener that triggers deployments
//!
//! Routes:
//!
//! | Method | Path    | Response                              |
//! |--------|---------|---------------------------------------|
//! | GET    | `/`     | `{"message": "Hello, world!"}`        |
//! | GET    | `/ping` | `{"status": "pong"}`                  |
//! | POST   | `/`     | `{"received": <payload>}` + deploy    |
//!
//! A POST starts a deployment in the background and is acknowledged
//! immediately, whatever the outcome of the deployment. Shutdown waits for
//! deployments already started.

use crate::command::CommandRunner;
use crate::core::{DeploymentConfig, ServerConfig};
use crate::execution::PipelineOrchestrator;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Header GitHub uses to name the delivered event
const EVENT_HEADER: &str = "x-github-event";

/// Shared state for webhook handlers
pub struct AppState<R> {
    pub orchestrator: Arc<PipelineOrchestrator<R>>,
    pub deployment: DeploymentConfig,
    deployments: TaskTracker,
}

impl<R> AppState<R> {
    pub fn new(orchestrator: Arc<PipelineOrchestrator<R>>, deployment: DeploymentConfig) -> Self {
        Self {
            orchestrator,
            deployment,
            deployments: TaskTracker::new(),
        }
    }

    /// Number of deployments started by deliveries that have not finished
    pub fn deployments_in_flight(&self) -> usize {
        self.deployments.len()
    }

    /// Wait until every deployment started so far has finished
    pub async fn wait_for_deployments(&self) {
        self.deployments.close();
        self.deployments.wait().await;
    }
}

/// Build the webhook router
pub fn build_router<R: CommandRunner + 'static>(state: Arc<AppState<R>>) -> Router {
    Router::new()
        .route("/", get(root).post(receive_webhook::<R>))
        .route("/ping", get(ping))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Hello, world!" }))
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "pong" }))
}

async fn receive_webhook<R: CommandRunner + 'static>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    if event == "ping" {
        info!("Received webhook ping, not deploying");
    } else {
        info!("Received webhook event '{}', starting deployment", event);
        let task_state = state.clone();
        state.deployments.spawn(async move {
            let state = task_state;
            if !state.orchestrator.run(&state.deployment).await {
                warn!("Deployment triggered by '{}' event did not complete", event);
            }
        });
    }

    Json(json!({ "received": payload }))
}

/// Bind the listener and serve until ctrl-c
pub async fn serve<R: CommandRunner + 'static>(
    server: &ServerConfig,
    state: Arc<AppState<R>>,
) -> Result<()> {
    let addr = format!("0.0.0.0:{}", server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!("Listening for webhooks on http://{}", local_addr);

    axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Deployment tasks would otherwise be dropped with the runtime, killing
    // a clone or fetch halfway through
    if state.deployments_in_flight() > 0 {
        info!("Waiting for {} in-flight deployment(s)", state.deployments_in_flight());
    }
    state.wait_for_deployments().await;

    info!("Webhook listener shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
