//! Task execution and port pool configuration

use crate::error::ConfigResult;
use crate::validation::{validate_port_range, validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Task execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Ports handed to tasks start right after this one
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Number of ports in the task pool
    #[serde(default = "default_port_pool_size")]
    pub port_pool_size: usize,

    /// Playground mode: cap the number of live tasks
    #[serde(default = "crate::domains::utils::default_false")]
    pub restricted: bool,

    /// Live task cap applied in restricted mode
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// Fallback language for task titles
    #[serde(default = "default_lang")]
    pub default_lang: String,

    /// Directory holding package executables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages_dir: Option<PathBuf>,

    #[serde(
        rename = "package_handshake_timeout_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_package_handshake_timeout"
    )]
    pub package_handshake_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_port: default_base_port(),
            port_pool_size: default_port_pool_size(),
            restricted: false,
            max_tasks: default_max_tasks(),
            default_lang: default_lang(),
            packages_dir: None,
            package_handshake_timeout: default_package_handshake_timeout(),
        }
    }
}

impl ExecutionConfig {
    pub fn first_port(&self) -> u16 {
        self.base_port.saturating_add(1)
    }

    pub fn last_port(&self) -> u16 {
        let last = self.base_port as usize + self.port_pool_size;
        last.min(u16::MAX as usize) as u16
    }

    /// Whether `port` belongs to the task pool
    pub fn owns_port(&self, port: u16) -> bool {
        port >= self.first_port() && port <= self.last_port()
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_port_range(self.base_port, "base_port", self.domain_name())?;
        validate_positive(self.port_pool_size, "port_pool_size", self.domain_name())?;

        if self.base_port as usize + self.port_pool_size > u16::MAX as usize {
            return Err(self.validation_error(format!(
                "port pool {}+{} exceeds the highest port",
                self.base_port, self.port_pool_size
            )));
        }

        // Every task holds two ports
        if self.port_pool_size < 2 {
            return Err(self.validation_error("port_pool_size must hold at least one task (2 ports)"));
        }

        if self.restricted {
            validate_positive(self.max_tasks, "max_tasks", self.domain_name())?;
        }

        validate_required_string(&self.default_lang, "default_lang", self.domain_name())?;

        if self.package_handshake_timeout.is_zero() {
            return Err(self.validation_error("package_handshake_timeout_ms must be greater than 0"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

fn default_base_port() -> u16 {
    3234
}

fn default_port_pool_size() -> usize {
    64
}

fn default_max_tasks() -> usize {
    3
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_package_handshake_timeout() -> Duration {
    Duration::from_millis(300)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_config_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.base_port, 3234);
        assert_eq!(config.port_pool_size, 64);
        assert!(!config.restricted);
        assert_eq!(config.max_tasks, 3);
        assert_eq!(config.default_lang, "en");
        assert_eq!(config.package_handshake_timeout, Duration::from_millis(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_bounds() {
        let config = ExecutionConfig {
            base_port: 4000,
            port_pool_size: 4,
            ..Default::default()
        };
        assert!(!config.owns_port(4000));
        assert!(config.owns_port(4001));
        assert!(config.owns_port(4004));
        assert!(!config.owns_port(4005));
    }

    #[test]
    fn test_execution_config_validation() {
        let mut config = ExecutionConfig {
            port_pool_size: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.port_pool_size = 64;
        config.base_port = 65500;
        assert!(config.validate().is_err());

        config.base_port = 3234;
        config.restricted = true;
        config.max_tasks = 0;
        assert!(config.validate().is_err());

        config.max_tasks = 2;
        assert!(config.validate().is_ok());
    }
}
