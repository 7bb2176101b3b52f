//! Request/response command channel with a task's local control endpoint
//!
//! Requests travel as a [`MessageEnvelope`] of [`CmdData`] in the body of a
//! `POST /cmd` to `localhost:<local_port>`. The answer comes back the same
//! way and must carry the task id of the request.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::IpcError;
use crate::protocol::{CmdData, MessageEnvelope, IPC_PROTOCOL_VERSION};

/// Server side of the command channel
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Execute a command; an `Err` is reported back in the `error` field
    async fn handle(&self, request: &CmdData) -> Result<JsonValue, String>;
}

/// Client for a task's control endpoint
#[derive(Debug, Clone)]
pub struct CommandClient {
    http: reqwest::Client,
    host: String,
}

impl CommandClient {
    pub fn new() -> Self {
        Self::with_host("localhost")
    }

    /// Client without a request timeout; callers bound the exchange themselves
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: host.into(),
        }
    }

    /// Fail exchanges that take longer than `timeout` with [`IpcError::Timeout`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    fn endpoint(&self, port: u16) -> String {
        format!("http://{}:{}/cmd", self.host, port)
    }

    /// Send one request and wait for its answer
    pub async fn send(&self, local_port: u16, request: &CmdData) -> Result<CmdData, IpcError> {
        let url = self.endpoint(local_port);
        debug!("Sending '{}' #{} to {}", request.cmd, request.unique, url);

        let body = serde_json::to_vec(&MessageEnvelope::new(request.clone()))
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        let envelope: MessageEnvelope<CmdData> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(IpcError::Remote(format!(
                    "HTTP {}: {}",
                    status,
                    String::from_utf8_lossy(&bytes).trim()
                )))
            }
            Err(e) => return Err(IpcError::DeserializationError(e.to_string())),
        };

        check_response(request, envelope)
    }
}

impl Default for CommandClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a decoded answer against its request
fn check_response(request: &CmdData, envelope: MessageEnvelope<CmdData>) -> Result<CmdData, IpcError> {
    if !envelope.is_compatible() {
        return Err(IpcError::ProtocolVersionMismatch {
            expected: IPC_PROTOCOL_VERSION,
            actual: envelope.protocol_version,
        });
    }

    let response = envelope.message;
    if response.task_id != request.task_id {
        warn!(
            "Command answer for task {} while talking to task {}",
            response.task_id, request.task_id
        );
        return Err(IpcError::ProtocolMismatch {
            expected: request.task_id,
            actual: response.task_id,
        });
    }

    if response.is_error() {
        return Err(IpcError::Remote(response.error));
    }

    Ok(response)
}

/// Serve one request body, producing the response body
///
/// Undecodable bodies are returned as an error so the HTTP layer can answer
/// 400; everything else yields a response echoing the request's task id and
/// unique.
pub async fn handle_request(body: &[u8], handler: &dyn CommandHandler) -> Result<Vec<u8>, IpcError> {
    let envelope: MessageEnvelope<CmdData> = serde_json::from_slice(body)?;
    if !envelope.is_compatible() {
        return Err(IpcError::ProtocolVersionMismatch {
            expected: IPC_PROTOCOL_VERSION,
            actual: envelope.protocol_version,
        });
    }

    let request = envelope.message;
    let response = match handler.handle(&request).await {
        Ok(value) => request.reply(value),
        Err(error) => {
            debug!("Command '{}' failed: {}", request.cmd, error);
            request.reply_error(error)
        }
    };

    serde_json::to_vec(&MessageEnvelope::new(response))
        .map_err(|e| IpcError::SerializationError(e.to_string()))
}
