//! Tracing subscriber setup shared by the supervisor and its children

mod init;

pub use init::{build_env_filter, init_child_tracing, init_logging_from_config, init_simple_tracing};
