//! Health check endpoint

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use sprocket_execution::Supervisor;
use std::sync::Arc;
use tracing::debug;

/// Liveness plus a few supervisor gauges
pub async fn health_check(State(supervisor): State<Arc<Supervisor>>) -> impl IntoResponse {
    debug!("Health check requested");

    let tasks = supervisor.list_tasks().await;
    let running = tasks.iter().filter(|task| !task.is_terminal()).count();

    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "tasks": tasks.len(),
        "running": running,
        "ports_in_use": supervisor.ports_in_use().await,
        "observers": supervisor.broadcaster().observer_count().await,
    }))
}
