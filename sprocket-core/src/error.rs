//! Core error types shared by capability implementations

use thiserror::Error;

/// Errors raised by a scripting engine capability
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Program text could not be compiled
    #[error("Compilation failed: {0}")]
    Compilation(String),

    /// Program failed while running
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Bytecode produced by a different engine
    #[error("Unsupported bytecode format: expected {expected}, got {actual}")]
    UnsupportedFormat { expected: String, actual: String },
}

/// Errors raised by trace storage
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
