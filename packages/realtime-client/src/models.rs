//! Typed update payloads for each subscribable resource kind
//!
//! The wire protocol carries `update` payloads as opaque JSON; this module
//! gives each resource kind its concrete shape and decodes payloads at the
//! deserialization boundary, before they reach any subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{ResourceId, ResourceKind};

/// A decoded update payload, one variant per resource kind
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Task(TaskUpdate),
    TaskLogs(TaskLogsUpdate),
    TaskStatus(TaskStatusUpdate),
    Project(ProjectUpdate),
}

impl UpdatePayload {
    /// Decode an opaque `update` payload according to its resource kind
    pub fn decode(
        resource: ResourceKind,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match resource {
            ResourceKind::Task => UpdatePayload::Task(serde_json::from_value(data)?),
            ResourceKind::TaskLogs => UpdatePayload::TaskLogs(serde_json::from_value(data)?),
            ResourceKind::TaskStatus => UpdatePayload::TaskStatus(serde_json::from_value(data)?),
            ResourceKind::Project => UpdatePayload::Project(serde_json::from_value(data)?),
        })
    }

    /// The resource kind this payload belongs to
    pub fn resource(&self) -> ResourceKind {
        match self {
            UpdatePayload::Task(_) => ResourceKind::Task,
            UpdatePayload::TaskLogs(_) => ResourceKind::TaskLogs,
            UpdatePayload::TaskStatus(_) => ResourceKind::TaskStatus,
            UpdatePayload::Project(_) => ResourceKind::Project,
        }
    }
}

/// Event delivered to topic subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    /// Resource kind of the topic
    pub resource: ResourceKind,

    /// Resource identifier of the topic
    pub id: ResourceId,

    /// Decoded payload
    pub payload: UpdatePayload,

    /// Server timestamp of the update (Unix ms), when provided
    pub timestamp: Option<i64>,
}

/// Lifecycle state of a coding-assistant task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Full task record pushed on a `task` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// Task identifier
    pub id: i64,

    /// Short human-readable title
    #[serde(default)]
    pub title: Option<String>,

    /// Current lifecycle state
    #[serde(default)]
    pub state: TaskState,

    /// Completion fraction (0.0 - 1.0), when the agent reports one
    #[serde(default)]
    pub progress: Option<f32>,

    /// Project this task belongs to
    #[serde(default)]
    pub project_id: Option<i64>,

    /// Last modification time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Appended log output pushed on a `task_logs` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLogsUpdate {
    /// New log lines, in emission order
    pub lines: Vec<LogLine>,

    /// Sequence number of the first line in this chunk
    #[serde(default)]
    pub offset: Option<u64>,
}

/// One line of task log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub message: String,

    /// Source stream (`stdout`, `stderr`, `system`)
    #[serde(default)]
    pub stream: Option<String>,

    /// Emission time (Unix ms)
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Lightweight status change pushed on a `task_status` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusUpdate {
    /// New lifecycle state
    pub state: TaskState,

    /// Completion fraction (0.0 - 1.0)
    #[serde(default)]
    pub progress: Option<f32>,

    /// Optional one-line status message from the agent
    #[serde(default)]
    pub message: Option<String>,
}

/// Project record pushed on a `project` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    /// Project identifier; may be omitted on partial updates (the topic id
    /// already names the project)
    #[serde(default)]
    pub id: Option<i64>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Whether the project has been archived
    #[serde(default)]
    pub archived: Option<bool>,

    /// Per-state task counts for dashboard tiles
    #[serde(default)]
    pub task_counts: Option<ProjectTaskCounts>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Task counts grouped by lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProjectTaskCounts {
    #[serde(default)]
    pub queued: u32,
    #[serde(default)]
    pub running: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
}
