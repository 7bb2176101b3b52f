//! Capability traits implemented by collaborators
//!
//! The supervisor never depends on a concrete script store, permission
//! model, translation catalogue, trace database or scripting language. Each
//! of those is reached through one of the traits below.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, StorageError};
use crate::script::ScriptDefinition;
use crate::task::{Task, TaskId};

/// Lookup of script definitions by name
pub trait ScriptRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<ScriptDefinition>>;

    fn names(&self) -> Vec<String>;
}

/// Access rule deciding whether a role may run a script
pub trait AccessPolicy: Send + Sync {
    fn can_run(&self, role_id: u32, script: &ScriptDefinition) -> bool;
}

/// Policy that lets every role run every script
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_run(&self, _role_id: u32, _script: &ScriptDefinition) -> bool {
        true
    }
}

/// Translation lookup for a single language
pub trait Localizer: Send + Sync {
    fn lookup(&self, lang: &str, key: &str) -> Option<String>;
}

/// In-memory translation table keyed by `(lang, key)`
#[derive(Debug, Clone, Default)]
pub struct LangTable {
    entries: HashMap<(String, String), String>,
}

impl LangTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lang: impl Into<String>, key: impl Into<String>, text: impl Into<String>) {
        self.entries.insert((lang.into(), key.into()), text.into());
    }

    /// Collect the localized titles declared by definitions
    pub fn from_definitions<'a>(defs: impl IntoIterator<Item = &'a ScriptDefinition>) -> Self {
        let mut table = Self::new();
        for def in defs {
            for (lang, text) in &def.titles {
                table.insert(lang.clone(), def.display_title(), text.clone());
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Localizer for LangTable {
    fn lookup(&self, lang: &str, key: &str) -> Option<String> {
        self.entries
            .get(&(lang.to_string(), key.to_string()))
            .cloned()
    }
}

/// Durable store for the final state of finished tasks
#[async_trait]
pub trait TraceStore: Send + Sync {
    async fn record(&self, task: &Task) -> Result<(), StorageError>;
}

/// Compiled program in an engine-specific format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytecode {
    /// Engine tag, checked by the executor before running
    pub engine: String,
    pub payload: Vec<u8>,
}

impl Bytecode {
    pub fn new(engine: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            engine: engine.into(),
            payload,
        }
    }
}

/// Turns program text into bytecode
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Bytecode, EngineError>;
}

/// Values visible to a running program
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEnv {
    pub task_id: TaskId,
    pub name: String,
    pub lang: String,
    pub data: JsonValue,
}

/// Runs bytecode to completion on the calling thread
pub trait Executor: Send + Sync {
    fn run(&self, bytecode: &Bytecode, env: &ExecutionEnv) -> Result<JsonValue, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_table_from_definitions() {
        let defs = vec![
            ScriptDefinition::new("hello")
                .with_title("Hello")
                .with_localized_title("fr", "Bonjour")
                .with_localized_title("de", "Hallo"),
            ScriptDefinition::new("plain"),
        ];

        let table = LangTable::from_definitions(&defs);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("fr", "Hello").as_deref(), Some("Bonjour"));
        assert_eq!(table.lookup("es", "Hello"), None);
    }

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.can_run(99, &ScriptDefinition::new("any")));
    }
}
