//! Trace persistence configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration
///
/// Without a `trace_file` finished tasks are only kept in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON-lines file receiving one record per finished task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_file: Option<PathBuf>,
}

impl Validatable for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(path) = &self.trace_file {
            if path.as_os_str().is_empty() {
                return Err(self.validation_error("trace_file cannot be empty"));
            }
            if path.is_dir() {
                return Err(self.validation_error(format!(
                    "trace_file {} is a directory",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "storage"
    }
}
