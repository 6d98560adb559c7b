//! Task models matching the `tasks` collection written by the web uploader

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Tasks
// ============================================================================

/// Field names used in task documents
pub mod fields {
    pub const STATUS: &str = "status";
    pub const FILE_PATH: &str = "filePath";
    pub const FILE_NAME: &str = "fileName";
    pub const PROCESSED_PATH: &str = "processedPath";
    pub const ERROR: &str = "error";
    pub const TIMESTAMP: &str = "timestamp";
}

/// Task - one document in the tasks collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub processed_path: Option<String>,
    pub error: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Task {
    /// A pending task pointing at `file_path`
    pub fn pending(id: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            file_path: Some(file_path.into()),
            file_name: None,
            processed_path: None,
            error: None,
            timestamp: None,
        }
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Processed,
    Error,
    /// A value written by some other producer; never processed
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processed => "processed",
            TaskStatus::Error => "error",
            TaskStatus::Other(value) => value,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Processed | TaskStatus::Error)
    }
}

impl From<&str> for TaskStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => TaskStatus::Pending,
            "processed" => TaskStatus::Processed,
            "error" => TaskStatus::Error,
            other => TaskStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        TaskStatus::from(value.as_str())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status write for a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    Processed { processed_path: String },
    Error { message: String },
}

impl TaskUpdate {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskUpdate::Processed { .. } => TaskStatus::Processed,
            TaskUpdate::Error { .. } => TaskStatus::Error,
        }
    }

    /// Fields written by this update, with the status stored under
    /// `status_field`
    pub fn values<'a>(&self, status_field: &'a str) -> Vec<(&'a str, String)> {
        let status = (status_field, self.status().to_string());
        match self {
            TaskUpdate::Processed { processed_path } => {
                vec![status, (fields::PROCESSED_PATH, processed_path.clone())]
            }
            TaskUpdate::Error { message } => vec![status, (fields::ERROR, message.clone())],
        }
    }

    /// Fields touched by this update. Fields listed here but absent from
    /// `values()` are cleared, so a terminal task carries only one of
    /// `processedPath` / `error`.
    pub fn field_mask<'a>(&self, status_field: &'a str) -> [&'a str; 3] {
        [status_field, fields::PROCESSED_PATH, fields::ERROR]
    }
}

/// NewTask - for creating a pending task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub file_path: String,
    pub file_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}
