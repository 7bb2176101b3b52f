//! Script definition source configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Directory of `*.yaml` script definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Validatable for ScriptsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(dir) = &self.dir {
            if dir.exists() && !dir.is_dir() {
                return Err(self.validation_error(format!("{} is not a directory", dir.display())));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scripts"
    }
}
