//! Script definitions held in memory, optionally loaded from YAML files

use sprocket_core::{ScriptDefinition, ScriptRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ExecutionError;

/// Name of the built-in raw source definition
pub const RAW_SOURCE_SCRIPT: &str = "source";

/// Definitions available without any configuration
pub fn builtin_definitions() -> Vec<ScriptDefinition> {
    vec![ScriptDefinition::raw_source(RAW_SOURCE_SCRIPT).with_title("Source code")]
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryScriptRegistry {
    definitions: HashMap<String, Arc<ScriptDefinition>>,
}

impl InMemoryScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in definitions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for def in builtin_definitions() {
            registry.insert(def);
        }
        registry
    }

    /// Add or replace a definition
    pub fn insert(&mut self, def: ScriptDefinition) {
        self.definitions.insert(def.name.clone(), Arc::new(def));
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ScriptDefinition> {
        self.definitions.values().map(|def| def.as_ref())
    }

    /// Built-ins plus every `*.yaml`/`*.yml` file in `dir`, one definition
    /// per file
    ///
    /// Files are read in name order, so a later file wins on duplicate names.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let dir = dir.as_ref();
        let mut registry = Self::with_builtins();

        let entries = std::fs::read_dir(dir)
            .map_err(|e| ExecutionError::Registry(format!("cannot read {}: {}", dir.display(), e)))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|ext| ext.to_str()),
                        Some("yaml") | Some("yml")
                    )
            })
            .collect();
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ExecutionError::Registry(format!("cannot read {}: {}", path.display(), e)))?;
            let def: ScriptDefinition = serde_yaml::from_str(&content)
                .map_err(|e| ExecutionError::Registry(format!("invalid definition {}: {}", path.display(), e)))?;

            if def.name.trim().is_empty() {
                return Err(ExecutionError::Registry(format!(
                    "definition in {} has no name",
                    path.display()
                )));
            }

            debug!("Loaded script '{}' from {}", def.name, path.display());
            registry.insert(def);
        }

        info!("Loaded {} script definitions from {}", registry.len(), dir.display());
        Ok(registry)
    }
}

impl ScriptRegistry for InMemoryScriptRegistry {
    fn get(&self, name: &str) -> Option<Arc<ScriptDefinition>> {
        self.definitions.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.keys().cloned().collect();
        names.sort();
        names
    }
}
