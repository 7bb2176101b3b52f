//! Stores for the final record of finished tasks

use async_trait::async_trait;
use sprocket_core::{StorageError, Task, TraceStore};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Appends one JSON line per finished task
pub struct JsonlTraceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTraceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in the file
    pub async fn load(&self) -> Result<Vec<Task>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StorageError::from))
            .collect()
    }
}

#[async_trait]
impl TraceStore for JsonlTraceStore {
    async fn record(&self, task: &Task) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(task)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!("Recorded trace for task {} in {}", task.id, self.path.display());
        Ok(())
    }
}

/// Keeps finished tasks in memory
#[derive(Default)]
pub struct MemoryTraceStore {
    records: RwLock<Vec<Task>>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<Task> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl TraceStore for MemoryTraceStore {
    async fn record(&self, task: &Task) -> Result<(), StorageError> {
        self.records.write().await.push(task.clone());
        Ok(())
    }
}
