//! Domain-driven configuration management for Sprocket
//!
//! Configuration is split by functional domain, loaded from YAML and
//! overridden from `SPROCKET_*` environment variables.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    execution::ExecutionConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    scripts::ScriptsConfig,
    server::ServerConfig,
    storage::StorageConfig,
    SprocketConfig,
};

pub use domains::utils::serde_duration_millis;
