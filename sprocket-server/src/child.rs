//! Routers served by a running child
//!
//! The control app listens on the task's local port and answers command
//! channel requests. The public app listens on the task's public port.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use sprocket_core::{Header, TaskStatus};
use sprocket_ipc::{handle_request, CommandHandler};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// What a child knows about itself
#[derive(Clone)]
pub struct ChildState {
    header: Arc<Header>,
    status: Arc<RwLock<TaskStatus>>,
    started_at: i64,
}

impl ChildState {
    pub fn new(header: Header) -> Self {
        Self {
            header: Arc::new(header),
            status: Arc::new(RwLock::new(TaskStatus::Start)),
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub async fn status(&self) -> TaskStatus {
        *self.status.read().await
    }

    pub async fn set_status(&self, status: TaskStatus) {
        *self.status.write().await = status;
    }

    /// JSON summary served on the public port
    pub async fn summary(&self) -> JsonValue {
        json!({
            "task_id": self.header.task_id,
            "name": self.header.name,
            "title": self.header.title,
            "lang": self.header.lang,
            "status": self.status().await,
            "started_at": self.started_at,
        })
    }
}

/// `POST /cmd` backed by `handler`
pub fn create_control_app(handler: Arc<dyn CommandHandler>) -> Router {
    Router::new().route("/cmd", post(control)).with_state(handler)
}

async fn control(State(handler): State<Arc<dyn CommandHandler>>, body: Bytes) -> impl IntoResponse {
    match handle_request(&body, handler.as_ref()).await {
        Ok(answer) => (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], answer),
        Err(e) => {
            warn!("Rejected command request: {}", e);
            (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string().into_bytes(),
            )
        }
    }
}

/// `GET /` with the task summary
pub fn create_public_app(state: ChildState) -> Router {
    Router::new().route("/", get(summary)).with_state(state)
}

async fn summary(State(state): State<ChildState>) -> impl IntoResponse {
    Json(state.summary().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use sprocket_core::TaskId;
    use sprocket_ipc::{CmdData, MessageEnvelope};
    use tower::ServiceExt;

    struct Ping;

    #[async_trait]
    impl CommandHandler for Ping {
        async fn handle(&self, request: &CmdData) -> Result<JsonValue, String> {
            match request.cmd.as_str() {
                "ping" => Ok(json!("pong")),
                other => Err(format!("unknown command {}", other)),
            }
        }
    }

    fn cmd_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/cmd")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_control_answers_with_same_ids() {
        let app = create_control_app(Arc::new(Ping));
        let request = CmdData::request(TaskId(8), "ping", JsonValue::Null);
        let body = serde_json::to_vec(&MessageEnvelope::new(request.clone())).unwrap();

        let response = app.oneshot(cmd_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let reply: MessageEnvelope<CmdData> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reply.message.task_id, TaskId(8));
        assert_eq!(reply.message.unique, request.unique);
        assert_eq!(reply.message.value, json!("pong"));
    }

    #[tokio::test]
    async fn test_control_rejects_garbage() {
        let app = create_control_app(Arc::new(Ping));
        let response = app.oneshot(cmd_request(b"not json".to_vec())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_public_summary_tracks_status() {
        let state = ChildState::new(Header::new(TaskId(3), "backup").with_title("Backup"));
        state.set_status(TaskStatus::Active).await;

        let app = create_public_app(state);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let summary: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(summary["task_id"], 3);
        assert_eq!(summary["title"], "Backup");
        assert_eq!(summary["status"], 1);
    }
}
