//! Script tree compiler for Sprocket
//!
//! Walks a tree of [`ScriptNode`](sprocket_core::ScriptNode)s, binds their
//! parameter values against the referenced definitions and emits linear
//! program text: shared free functions, one function per distinct
//! definition body, and a trailing run block calling the top-level nodes.

pub mod binding;
pub mod error;
pub mod ident;
pub mod source;

pub use binding::{bind_params, BoundValue};
pub use error::CompileError;
pub use ident::normalize_ident;
pub use source::{GeneratedSource, SourceCompiler};
