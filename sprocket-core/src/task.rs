//! Task domain model and lifecycle

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::header::Header;

/// Identifier of a running or finished task (newtype pattern for type safety)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl TaskId {
    /// Create a new random task ID
    pub fn random() -> Self {
        TaskId(rand::random::<u32>())
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TaskId {
    fn from(id: u32) -> Self {
        TaskId(id)
    }
}

/// Task lifecycle status
///
/// Encoded on the wire as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum TaskStatus {
    /// Registered, child not yet confirmed running
    Start = 0,
    Active = 1,
    Waiting = 2,
    Suspended = 3,
    Finished = 4,
    Terminated = 5,
    Failed = 6,
    Crashed = 7,
}

impl TaskStatus {
    /// Check if the task is in a terminal (absorbing) state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Terminated | TaskStatus::Failed | TaskStatus::Crashed
        )
    }

    /// Whether a report moving the task to `next` is a valid transition
    ///
    /// Terminal states accept nothing; `Start` is only ever the initial state.
    /// Repeating a non-terminal status is allowed so a task can refresh its
    /// message.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next != TaskStatus::Start || *self == TaskStatus::Start
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Start => "start",
            TaskStatus::Active => "active",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Suspended => "suspended",
            TaskStatus::Finished => "finished",
            TaskStatus::Terminated => "terminated",
            TaskStatus::Failed => "failed",
            TaskStatus::Crashed => "crashed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<TaskStatus> for i32 {
    fn from(status: TaskStatus) -> Self {
        status as i32
    }
}

impl TryFrom<i32> for TaskStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TaskStatus::Start),
            1 => Ok(TaskStatus::Active),
            2 => Ok(TaskStatus::Waiting),
            3 => Ok(TaskStatus::Suspended),
            4 => Ok(TaskStatus::Finished),
            5 => Ok(TaskStatus::Terminated),
            6 => Ok(TaskStatus::Failed),
            7 => Ok(TaskStatus::Crashed),
            other => Err(format!("Invalid task status: {}", other)),
        }
    }
}

/// The supervisor's record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub name: String,
    pub title: String,
    pub user_id: u32,
    pub role_id: u32,
    pub http_port: u16,
    pub local_port: u16,
    /// Unix seconds
    pub started_at: i64,
    /// Unix seconds, 0 while the task is not terminal
    pub finished_at: i64,
    pub message: String,
}

impl Task {
    /// Create the record for a freshly launched run
    pub fn from_header(header: &Header) -> Self {
        Self {
            id: header.task_id,
            status: TaskStatus::Start,
            name: header.name.clone(),
            title: header.title.clone(),
            user_id: header.user_id,
            role_id: header.role_id,
            http_port: header.http_port,
            local_port: header.local_port,
            started_at: Utc::now().timestamp(),
            finished_at: 0,
            message: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
