//! Supervisor router setup

use axum::{
    routing::{get, post},
    Router,
};
use sprocket_execution::Supervisor;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Enable permissive CORS for browser clients on other origins
    pub enable_cors: bool,
    /// Enable request tracing
    pub enable_tracing: bool,
    /// API path prefix
    pub api_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enable_cors: false,
            enable_tracing: true,
            api_prefix: "/api".to_string(),
        }
    }
}

/// Create the supervisor application
pub fn create_supervisor_app(supervisor: Arc<Supervisor>, config: AppConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ws", get(handlers::ws_handler))
        .nest(&config.api_prefix, create_api_router())
        .with_state(supervisor);

    if config.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    if config.enable_tracing {
        app = app.layer(TraceLayer::new_for_http());
    }

    app
}

fn create_api_router() -> Router<Arc<Supervisor>> {
    Router::new()
        .route("/taskstatus", post(handlers::update_status))
        .route("/run", post(handlers::run_script))
        .route("/tasks", get(handlers::list_tasks))
        .route("/tasks/{id}", get(handlers::get_task))
        .route("/tasks/{id}/cmd", post(handlers::send_command))
        .route("/tasks/{id}/package", post(handlers::start_package))
}
