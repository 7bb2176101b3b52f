//! IPC error types

use sprocket_core::TaskId;
use thiserror::Error;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// HTTP transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol version mismatch
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch { expected: u32, actual: u32 },

    /// Response answered for another task
    #[error("Protocol mismatch: expected task {expected}, got {actual}")]
    ProtocolMismatch { expected: TaskId, actual: TaskId },

    /// Peer reported an error
    #[error("Remote error: {0}")]
    Remote(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for response")]
    Timeout,

    /// Package did not complete its handshake
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Invalid message format
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

impl IpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IpcError::IoError(_) | IpcError::Timeout | IpcError::Transport(_)
        )
    }

    /// Check if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::ProtocolVersionMismatch { .. }
                | IpcError::ProtocolMismatch { .. }
                | IpcError::InvalidMessage(_)
        )
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        IpcError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            IpcError::IoError(err.to_string())
        } else if err.is_data() || err.is_syntax() || err.is_eof() {
            IpcError::DeserializationError(err.to_string())
        } else {
            IpcError::SerializationError(err.to_string())
        }
    }
}

impl From<reqwest::Error> for IpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IpcError::Timeout
        } else {
            IpcError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(IpcError::IoError("network error".to_string()).is_retryable());
        assert!(IpcError::Timeout.is_retryable());
        assert!(!IpcError::ProtocolVersionMismatch { expected: 1, actual: 2 }.is_retryable());
        assert!(!IpcError::Remote("no such command".to_string()).is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        let mismatch = IpcError::ProtocolMismatch {
            expected: TaskId(5),
            actual: TaskId(6),
        };
        assert!(mismatch.is_fatal());
        assert_eq!(mismatch.to_string(), "Protocol mismatch: expected task 5, got 6");
        assert!(IpcError::InvalidMessage("bad format".to_string()).is_fatal());
        assert!(!IpcError::Timeout.is_fatal());
    }

    #[test]
    fn test_json_errors_classify_as_deserialization() {
        let err: IpcError = serde_json::from_str::<u32>("{").unwrap_err().into();
        assert!(matches!(err, IpcError::DeserializationError(_)));
    }
}
