//! Run, list, status and command endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sprocket_core::TaskId;
use sprocket_execution::{RunRequest, Supervisor};
use sprocket_ipc::StatusReport;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{WebError, WebResult};

/// Body of `POST /api/tasks/{id}/cmd`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub cmd: String,
    #[serde(default)]
    pub value: JsonValue,
}

/// Body of `POST /api/tasks/{id}/package`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRequest {
    pub name: String,
}

/// Start a script; answers 201 with the task id and public port
pub async fn run_script(
    State(supervisor): State<Arc<Supervisor>>,
    Json(request): Json<RunRequest>,
) -> WebResult<impl IntoResponse> {
    if request.script.trim().is_empty() {
        return Err(WebError::bad_request("script name is required"));
    }
    info!("Run requested for '{}'", request.script);

    let outcome = supervisor.run_script(request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Status report posted by a running child
pub async fn update_status(
    State(supervisor): State<Arc<Supervisor>>,
    Json(report): Json<StatusReport>,
) -> WebResult<impl IntoResponse> {
    debug!("Status {} reported for task {}", report.status, report.task_id);

    let task = supervisor.update_status(report).await?;
    Ok(Json(task))
}

pub async fn list_tasks(State(supervisor): State<Arc<Supervisor>>) -> impl IntoResponse {
    Json(supervisor.list_tasks().await)
}

pub async fn get_task(
    State(supervisor): State<Arc<Supervisor>>,
    Path(task_id): Path<u32>,
) -> WebResult<impl IntoResponse> {
    let task = supervisor.get_task(TaskId(task_id)).await?;
    Ok(Json(task))
}

/// Forward a command to the task's control endpoint and return its reply
pub async fn send_command(
    State(supervisor): State<Arc<Supervisor>>,
    Path(task_id): Path<u32>,
    Json(request): Json<CommandRequest>,
) -> WebResult<impl IntoResponse> {
    if request.cmd.is_empty() {
        return Err(WebError::bad_request("cmd is required"));
    }
    info!("Sending '{}' to task {}", request.cmd, task_id);

    let reply = supervisor
        .send_command(TaskId(task_id), &request.cmd, request.value)
        .await?;
    Ok(Json(reply))
}

/// Start an auxiliary package for the task and return the port it serves on
pub async fn start_package(
    State(supervisor): State<Arc<Supervisor>>,
    Path(task_id): Path<u32>,
    Json(request): Json<PackageRequest>,
) -> WebResult<impl IntoResponse> {
    info!("Starting package '{}' for task {}", request.name, task_id);

    let port = supervisor.start_package(TaskId(task_id), &request.name).await?;
    Ok(Json(serde_json::json!({ "name": request.name, "port": port })))
}
