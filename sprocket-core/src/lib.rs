//! Core domain models and types for Sprocket
//!
//! This crate contains the fundamental types and traits used throughout
//! the Sprocket system: script trees, the per-run header, the task record
//! and its lifecycle, and the capability traits that external collaborators
//! (script registries, access rules, localization, trace storage and the
//! scripting engine) plug into.

pub mod capability;
pub mod error;
pub mod header;
pub mod script;
pub mod task;

// Re-export commonly used types at the crate root
pub use capability::{
    AccessPolicy, AllowAll, Bytecode, Compiler, ExecutionEnv, Executor, LangTable, Localizer,
    ScriptRegistry, TraceStore,
};
pub use error::{EngineError, StorageError};
pub use header::Header;
pub use script::{ParamDef, ParamType, ScriptDefinition, ScriptKind, ScriptNode};
pub use task::{Task, TaskId, TaskStatus};
