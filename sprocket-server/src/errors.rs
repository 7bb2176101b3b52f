//! Web error type and its mapping from supervisor errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sprocket_core::EngineError;
use sprocket_execution::ExecutionError;
use sprocket_ipc::IpcError;
use thiserror::Error;
use tracing::error;

/// Error type for HTTP API operations
#[derive(Debug, Error)]
pub enum WebError {
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Too many requests: {message}")]
    TooManyRequests { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;

impl WebError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        WebError::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        WebError::NotFound {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        WebError::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            WebError::Forbidden { .. } => StatusCode::FORBIDDEN,
            WebError::NotFound { .. } => StatusCode::NOT_FOUND,
            WebError::Conflict { .. } => StatusCode::CONFLICT,
            WebError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            WebError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WebError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            WebError::BadRequest { .. } => "BAD_REQUEST",
            WebError::Forbidden { .. } => "FORBIDDEN",
            WebError::NotFound { .. } => "NOT_FOUND",
            WebError::Conflict { .. } => "CONFLICT",
            WebError::TooManyRequests { .. } => "RATE_LIMITED",
            WebError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            WebError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Internal details stay in the log
            WebError::Internal { message } => {
                error!("Internal error: {}", message);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let error_response = json!({
            "error": {
                "code": self.error_code(),
                "message": message,
                "status": status.as_u16()
            }
        });
        (status, Json(error_response)).into_response()
    }
}

impl From<ExecutionError> for WebError {
    fn from(err: ExecutionError) -> Self {
        let message = err.to_string();
        match err {
            ExecutionError::ScriptNotFound(_) | ExecutionError::TaskNotFound(_) => {
                WebError::NotFound { message }
            }
            ExecutionError::AccessDenied { .. } => WebError::Forbidden { message },
            ExecutionError::Unrunnable(_)
            | ExecutionError::Compile(_)
            | ExecutionError::Engine(EngineError::Compilation(_))
            | ExecutionError::PackagesDisabled => WebError::BadRequest { message },
            ExecutionError::InvalidTransition { .. } | ExecutionError::TaskNotRunning(_) => {
                WebError::Conflict { message }
            }
            ExecutionError::LimitExceeded { .. } => WebError::TooManyRequests { message },
            ExecutionError::PoolExhausted => WebError::ServiceUnavailable { message },
            ExecutionError::Ipc(ref ipc) if ipc.is_retryable() => WebError::ServiceUnavailable { message },
            ExecutionError::Ipc(IpcError::Remote(remote)) => WebError::Conflict { message: remote },
            ExecutionError::Ipc(IpcError::HandshakeFailed(_)) => WebError::ServiceUnavailable { message },
            _ => WebError::Internal { message },
        }
    }
}
