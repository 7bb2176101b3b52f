//! Sprocket task supervision
//!
//! This crate runs compiled script trees in child processes: it hands out
//! ports from a bounded pool, launches children with their job on stdin,
//! tracks each run through its lifecycle and pushes status changes to
//! observers.

pub mod broadcast;
pub mod error;
pub mod launcher;
pub mod package;
pub mod ports;
pub mod registry;
pub mod supervisor;
pub mod trace;

// Re-export main types
pub use broadcast::{ObserverFrame, ObserverMessage, StatusBroadcaster, CMD_CLOSE, CMD_STATUS};
pub use error::ExecutionError;
pub use launcher::{ChildHandle, ChildLauncher, ProcessLauncher};
pub use package::PackageManager;
pub use ports::PortPool;
pub use registry::{builtin_definitions, InMemoryScriptRegistry};
pub use supervisor::{RunOutcome, RunRequest, Supervisor, SupervisorConfig, STOP_COMMAND};
pub use trace::{JsonlTraceStore, MemoryTraceStore};
