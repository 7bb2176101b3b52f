//! Fan-out of task status changes to observer connections

use serde::{Deserialize, Serialize};
use sprocket_core::{Task, TaskStatus};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Frame kind: a task changed status
pub const CMD_STATUS: u32 = 0;
/// Frame kind: the supervisor is closing the connection
pub const CMD_CLOSE: u32 = 1;

/// JSON frame delivered to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverFrame {
    pub cmd: u32,
    pub status: Option<TaskStatus>,
    pub message: String,
    /// Unix seconds, carried on the wire as a decimal string
    #[serde(with = "unix_time_string")]
    pub time: i64,
    pub task: Option<Task>,
}

mod unix_time_string {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(time)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

impl ObserverFrame {
    pub fn status(task: &Task, time: i64) -> Self {
        Self {
            cmd: CMD_STATUS,
            status: Some(task.status),
            message: task.message.clone(),
            time,
            task: Some(task.clone()),
        }
    }

    pub fn close() -> Self {
        Self {
            cmd: CMD_CLOSE,
            status: None,
            message: String::new(),
            time: chrono::Utc::now().timestamp(),
            task: None,
        }
    }
}

/// What an observer's writer task pushes to its socket
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverMessage {
    /// Serialized [`ObserverFrame`]
    Text(String),
    /// Close the socket
    Close,
}

/// Channel sender half for pushing messages to an observer connection
pub type ObserverSender = mpsc::UnboundedSender<ObserverMessage>;

struct Observer {
    sender: ObserverSender,
    connected_at: i64,
}

/// Registry of observer connections
///
/// Thread-safe via interior `RwLock`; shared behind an `Arc`.
pub struct StatusBroadcaster {
    observers: RwLock<HashMap<String, Observer>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection, returning the receiver its writer drains
    pub async fn add(&self, conn_id: impl Into<String>) -> mpsc::UnboundedReceiver<ObserverMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = Observer {
            sender: tx,
            connected_at: chrono::Utc::now().timestamp(),
        };
        self.observers.write().await.insert(conn_id.into(), observer);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        self.observers.write().await.remove(conn_id);
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Unix time the connection was registered
    pub async fn connected_at(&self, conn_id: &str) -> Option<i64> {
        self.observers.read().await.get(conn_id).map(|o| o.connected_at)
    }

    /// Send a frame to every observer, returning how many received it
    ///
    /// Observers whose channel is closed are dropped from the registry.
    pub async fn publish(&self, frame: &ObserverFrame) -> usize {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                debug!("Failed to serialize observer frame: {}", e);
                return 0;
            }
        };

        let mut failed = Vec::new();
        let mut delivered = 0;
        {
            let observers = self.observers.read().await;
            for (conn_id, observer) in observers.iter() {
                if observer.sender.send(ObserverMessage::Text(text.clone())).is_ok() {
                    delivered += 1;
                } else {
                    failed.push(conn_id.clone());
                }
            }
        }

        if !failed.is_empty() {
            let mut observers = self.observers.write().await;
            for conn_id in &failed {
                debug!(conn_id = %conn_id, "Dropping observer after failed delivery");
                observers.remove(conn_id);
            }
        }

        delivered
    }

    /// Send a close frame to every observer, then forget them all
    pub async fn shutdown_all(&self) {
        let text = serde_json::to_string(&ObserverFrame::close()).unwrap_or_default();
        let mut observers = self.observers.write().await;
        let count = observers.len();
        for observer in observers.values() {
            let _ = observer.sender.send(ObserverMessage::Text(text.clone()));
            let _ = observer.sender.send(ObserverMessage::Close);
        }
        observers.clear();
        info!(count, "Closed all observer connections");
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprocket_core::{Header, TaskId};

    fn task(status: TaskStatus) -> Task {
        let mut task = Task::from_header(&Header::new(TaskId(8), "job"));
        task.status = status;
        task.message = "working".to_string();
        task
    }

    #[tokio::test]
    async fn test_publish_reaches_every_observer() {
        let broadcaster = StatusBroadcaster::new();
        let mut a = broadcaster.add("a").await;
        let mut b = broadcaster.add("b").await;

        let delivered = broadcaster
            .publish(&ObserverFrame::status(&task(TaskStatus::Active), 100))
            .await;
        assert_eq!(delivered, 2);

        for rx in [&mut a, &mut b] {
            let ObserverMessage::Text(text) = rx.recv().await.unwrap() else {
                panic!("expected a text frame");
            };
            let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(raw["time"], "100");

            let frame: ObserverFrame = serde_json::from_str(&text).unwrap();
            assert_eq!(frame.cmd, CMD_STATUS);
            assert_eq!(frame.status, Some(TaskStatus::Active));
            assert_eq!(frame.time, 100);
            assert_eq!(frame.task.unwrap().id, TaskId(8));
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_drops_only_that_observer() {
        let broadcaster = StatusBroadcaster::new();
        let gone = broadcaster.add("gone").await;
        let mut alive = broadcaster.add("alive").await;
        drop(gone);

        let delivered = broadcaster
            .publish(&ObserverFrame::status(&task(TaskStatus::Finished), 5))
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(broadcaster.observer_count().await, 1);
        assert!(matches!(alive.recv().await, Some(ObserverMessage::Text(_))));
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_frame() {
        let broadcaster = StatusBroadcaster::new();
        let mut rx = broadcaster.add("a").await;

        broadcaster.shutdown_all().await;
        assert_eq!(broadcaster.observer_count().await, 0);

        let ObserverMessage::Text(text) = rx.recv().await.unwrap() else {
            panic!("expected a text frame");
        };
        let frame: ObserverFrame = serde_json::from_str(&text).unwrap();
        assert_eq!(frame.cmd, CMD_CLOSE);
        assert_eq!(rx.recv().await, Some(ObserverMessage::Close));
        assert_eq!(rx.recv().await, None);
    }
}
