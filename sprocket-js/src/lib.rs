//! JavaScript engine for Sprocket
//!
//! Implements the [`Compiler`](sprocket_core::Compiler) and
//! [`Executor`](sprocket_core::Executor) capabilities on top of the Boa
//! engine. Boa contexts are not `Send`; callers on an async runtime run the
//! executor on a blocking thread.

mod conversion;
mod engine;

pub use conversion::convert_js_result_to_json;
pub use engine::{JsCompiler, JsExecutor, ENGINE_TAG};

use sprocket_core::EngineError;
use thiserror::Error;

/// JavaScript execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JsExecutionError {
    #[error("Compilation error: {0}")]
    CompilationError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Input preparation error: {0}")]
    InputError(String),

    #[error("Output conversion error: {0}")]
    OutputError(String),

    #[error("Unsupported bytecode engine '{0}'")]
    UnsupportedEngine(String),
}

impl From<JsExecutionError> for EngineError {
    fn from(err: JsExecutionError) -> Self {
        match err {
            JsExecutionError::CompilationError(msg) => EngineError::Compilation(msg),
            JsExecutionError::UnsupportedEngine(actual) => EngineError::UnsupportedFormat {
                expected: ENGINE_TAG.to_string(),
                actual,
            },
            other => EngineError::Runtime(other.to_string()),
        }
    }
}
