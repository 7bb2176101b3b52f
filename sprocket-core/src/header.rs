//! The per-run job descriptor handed to a spawned child

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::task::TaskId;

/// Immutable snapshot describing one run
///
/// Built once by the supervisor before launch and never mutated after the
/// handoff. Fields owned by collaborators outside this workspace travel in
/// `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub task_id: TaskId,
    /// Name of the top-level script
    pub name: String,
    pub title: String,
    pub lang: String,
    pub user_id: u32,
    pub role_id: u32,
    /// Public port served by the task
    pub http_port: u16,
    /// Local control port (`POST /cmd`)
    pub local_port: u16,
    /// Supervisor port receiving status reports
    pub server_port: u16,
    #[serde(default)]
    pub console: bool,
    #[serde(default)]
    pub log_level: Option<String>,
    /// Restricted (playground) mode
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub max_tasks: usize,
    #[serde(default)]
    pub data: JsonValue,
    #[serde(default)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl Header {
    pub fn new(task_id: TaskId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            task_id,
            title: name.clone(),
            name,
            lang: String::new(),
            user_id: 0,
            role_id: 0,
            http_port: 0,
            local_port: 0,
            server_port: 0,
            console: false,
            log_level: None,
            restricted: false,
            max_tasks: 0,
            data: JsonValue::Null,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_ports(mut self, http_port: u16, local_port: u16) -> Self {
        self.http_port = http_port;
        self.local_port = local_port;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_identity(mut self, user_id: u32, role_id: u32) -> Self {
        self.user_id = user_id;
        self.role_id = role_id;
        self
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data;
        self
    }

    pub fn with_restricted(mut self, max_tasks: usize) -> Self {
        self.restricted = true;
        self.max_tasks = max_tasks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_builder() {
        let header = Header::new(TaskId(42), "backup")
            .with_title("Backup files")
            .with_lang("fr")
            .with_identity(1, 2)
            .with_ports(3235, 3236)
            .with_server_port(3234)
            .with_data(json!({"path": "/tmp"}))
            .with_restricted(3);

        assert_eq!(header.task_id, TaskId(42));
        assert_eq!(header.title, "Backup files");
        assert_eq!(header.local_port, 3236);
        assert!(header.restricted);
        assert_eq!(header.max_tasks, 3);
        assert_eq!(header.data["path"], "/tmp");
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let mut header = Header::new(TaskId(1), "x");
        header.extra.insert("theme".to_string(), json!("dark"));

        let encoded = serde_json::to_string(&header).unwrap();
        let decoded: Header = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.extra.get("theme"), Some(&json!("dark")));
    }
}
