//! Task-mutation event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Updated,
}

impl TaskEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventKind::Created => "created",
            TaskEventKind::Updated => "updated",
        }
    }
}

impl std::fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable envelope describing one committed task mutation.
///
/// Carries a full serialized snapshot of the task, not a reference; the
/// envelope is constructed once per commit, fanned out to zero or more
/// connections, and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub tenant_id: String,
    pub task: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(kind: TaskEventKind, tenant_id: impl Into<String>, task: serde_json::Value) -> Self {
        Self {
            kind,
            tenant_id: tenant_id.into(),
            task,
            emitted_at: Utc::now(),
        }
    }

    /// Task title from the snapshot, for human-readable messages.
    pub fn title(&self) -> &str {
        self.task
            .get("title")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
    }
}
