//! Error types for task supervision

use sprocket_compiler::CompileError;
use sprocket_core::{EngineError, StorageError, TaskId, TaskStatus};
use sprocket_ipc::IpcError;
use thiserror::Error;

/// Task supervision errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No free port left in the pool")]
    PoolExhausted,

    #[error("Too many running tasks (limit {limit})")]
    LimitExceeded { limit: usize },

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Role {role_id} may not run '{script}'")]
    AccessDenied { script: String, role_id: u32 },

    #[error("Script '{0}' cannot be run")]
    Unrunnable(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Handoff to child failed: {0}")]
    HandoffIo(String),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task {0} is not running")]
    TaskNotRunning(TaskId),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No packages directory configured")]
    PackagesDisabled,

    #[error("Registry error: {0}")]
    Registry(String),
}

impl ExecutionError {
    /// Whether the caller sent something wrong, as opposed to a server fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::ScriptNotFound(_)
                | ExecutionError::AccessDenied { .. }
                | ExecutionError::Unrunnable(_)
                | ExecutionError::Compile(_)
                | ExecutionError::Engine(EngineError::Compilation(_))
                | ExecutionError::TaskNotFound(_)
                | ExecutionError::InvalidTransition { .. }
                | ExecutionError::TaskNotRunning(_)
                | ExecutionError::PackagesDisabled
        )
    }
}
