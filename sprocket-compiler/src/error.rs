//! Compilation error types

use thiserror::Error;

/// Errors raised while compiling a script tree
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("unknown script {0}")]
    UnknownScript(String),

    #[error("field '{field}' of '{script}' is required")]
    MissingRequired { field: String, script: String },

    #[error("field '{field}' of '{script}' has invalid value '{value}'")]
    InvalidValue {
        field: String,
        script: String,
        value: String,
    },
}
