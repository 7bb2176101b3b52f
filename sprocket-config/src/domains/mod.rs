//! Domain-specific configuration modules

pub mod execution;
pub mod logging;
pub mod scripts;
pub mod server;
pub mod storage;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Sprocket configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SprocketConfig {
    /// Task execution and port allocation
    #[serde(default)]
    pub execution: execution::ExecutionConfig,

    /// Supervisor HTTP listener
    #[serde(default)]
    pub server: server::ServerConfig,

    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Trace persistence
    #[serde(default)]
    pub storage: storage::StorageConfig,

    /// Script definition sources
    #[serde(default)]
    pub scripts: scripts::ScriptsConfig,
}

impl SprocketConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.execution.validate()?;
        self.server.validate()?;
        self.logging.validate()?;
        self.storage.validate()?;
        self.scripts.validate()?;

        // The supervisor listens next to the pool, never inside it
        if self.execution.owns_port(self.server.port) {
            return Err(self.server.validation_error(format!(
                "port {} overlaps the task port pool {}..={}",
                self.server.port,
                self.execution.first_port(),
                self.execution.last_port()
            )));
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = SprocketConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
