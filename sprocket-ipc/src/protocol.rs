//! IPC protocol definitions and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sprocket_core::{Header, TaskId, TaskStatus};
use std::sync::atomic::{AtomicU64, Ordering};

/// IPC protocol version for compatibility checking
pub const IPC_PROTOCOL_VERSION: u32 = 1;

static UNIQUE: AtomicU64 = AtomicU64::new(0);

/// Next exchange id, monotonic for the whole process
pub fn next_unique() -> u64 {
    UNIQUE.fetch_add(1, Ordering::Relaxed) + 1
}

/// One frame of the stdin handoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandoffFrame {
    Header(Header),
    /// Compiled program, payload base64 encoded
    Bytecode { engine: String, payload: String },
}

/// Command channel request and response
///
/// A well-formed response always echoes the `task_id` and `unique` of its
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdData {
    pub task_id: TaskId,
    pub unique: u64,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub value: JsonValue,
}

impl CmdData {
    /// Create a request with a fresh unique id
    pub fn request(task_id: TaskId, cmd: impl Into<String>, value: JsonValue) -> Self {
        Self {
            task_id,
            unique: next_unique(),
            finished: false,
            cmd: cmd.into(),
            error: String::new(),
            value,
        }
    }

    /// Successful answer to this request
    pub fn reply(&self, value: JsonValue) -> Self {
        Self {
            task_id: self.task_id,
            unique: self.unique,
            finished: true,
            cmd: self.cmd.clone(),
            error: String::new(),
            value,
        }
    }

    /// Failed answer to this request
    pub fn reply_error(&self, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..self.reply(JsonValue::Null)
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Status report posted by a child to the supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(rename = "TaskID")]
    pub task_id: TaskId,
    #[serde(rename = "Status")]
    pub status: TaskStatus,
    #[serde(rename = "Message", default)]
    pub message: String,
    /// Unix seconds, 0 means "now"
    #[serde(rename = "Time", default)]
    pub time: i64,
}

impl StatusReport {
    pub fn new(task_id: TaskId, status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            task_id,
            status,
            message: message.into(),
            time: Utc::now().timestamp(),
        }
    }

    /// Report time, substituting the current time for 0
    pub fn effective_time(&self) -> i64 {
        if self.time == 0 {
            Utc::now().timestamp()
        } else {
            self.time
        }
    }
}

/// Message envelope for all IPC communications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: IPC_PROTOCOL_VERSION,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == IPC_PROTOCOL_VERSION
    }
}
