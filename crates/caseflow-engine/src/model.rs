//! Runtime records: workflow instances, node instances, tasks, log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflow instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Instance is actively executing automated work
    Running,

    /// Instance is parked on a human task or a timer
    Waiting,

    /// Instance reached an end node
    Completed,

    /// Instance failed terminally
    Failed,
}

impl InstanceStatus {
    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Node instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeInstanceStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
}

impl std::fmt::Display for NodeInstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Task status in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Kind of work a task represents
///
/// The dispatcher routes a claimed task to a handler keyed by this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Automated,
    Human,
    Timer,
    Event,
    Llm,
    Notification,
    Integration,
    DataOperation,
    BulkImport,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::Human => "human",
            Self::Timer => "timer",
            Self::Event => "event",
            Self::Llm => "llm",
            Self::Notification => "notification",
            Self::Integration => "integration",
            Self::DataOperation => "data_operation",
            Self::BulkImport => "bulk_import",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One running execution of a workflow definition version
#[derive(Debug, Clone)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub version: i32,
    pub status: InstanceStatus,

    /// The node currently being visited, matching the single live node instance
    pub current_node_id: Option<Uuid>,

    /// Merged key-value state accumulated from every task result payload
    pub state: serde_json::Map<String, serde_json::Value>,

    /// Final output, set when an end node is reached
    pub output: Option<serde_json::Value>,

    /// Terminal error, set when the instance fails
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One visit of a node during one instance's execution
///
/// Created each time a node is entered; never reused. The sequence number
/// is monotonic within the instance and derived inside the inserting
/// transaction.
#[derive(Debug, Clone)]
pub struct NodeInstance {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub node_id: Uuid,
    pub status: NodeInstanceStatus,
    pub sequence: i32,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A new node instance to be inserted (sequence assigned by the store)
#[derive(Debug, Clone)]
pub struct NewNodeInstance {
    pub instance_id: Uuid,
    pub node_id: Uuid,
    pub status: NodeInstanceStatus,
    pub input: serde_json::Value,
}

/// The schedulable unit bound to exactly one node instance
///
/// A task is the only entity a worker claims. Lifecycle:
/// Pending -> Running (lock set) -> Completed, rescheduled (back to Pending
/// with a future `scheduled_at`), or dead-lettered (Failed + dead-letter).
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub node_instance_id: Uuid,
    pub kind: TaskKind,
    pub queue: String,

    /// Lower values are claimed first
    pub priority: i32,

    pub status: TaskStatus,

    /// Lock owner; meaningful only while status = Running with an unexpired lease
    pub locked_by: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,

    /// Incremented at claim time, so the count includes the in-flight attempt
    pub retry_count: i32,
    pub max_retries: i32,

    /// Earliest claim time; supports delayed scheduling, retries, and timers
    pub scheduled_at: Option<DateTime<Utc>>,
    pub picked_at: Option<DateTime<Utc>>,
    pub timeout_at: Option<DateTime<Utc>>,

    pub is_dead_letter: bool,
    pub dead_letter_reason: Option<String>,
    pub dead_lettered_at: Option<DateTime<Utc>>,

    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_detail: Option<String>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A new task to be enqueued
#[derive(Debug, Clone)]
pub struct NewTask {
    pub instance_id: Uuid,
    pub node_instance_id: Uuid,
    pub kind: TaskKind,
    pub queue: String,
    pub priority: i32,
    pub max_retries: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub timeout_at: Option<DateTime<Utc>>,
    pub input: serde_json::Value,
}

impl NewTask {
    /// Create a task with default priority and no scheduling constraints
    pub fn new(
        instance_id: Uuid,
        node_instance_id: Uuid,
        kind: TaskKind,
        queue: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            instance_id,
            node_instance_id,
            kind,
            queue: queue.into(),
            priority: 0,
            max_retries: 3,
            scheduled_at: None,
            timeout_at: None,
            input,
        }
    }

    /// Set the priority (lower = claimed first)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay the earliest claim time
    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Set an execution deadline
    pub fn with_timeout_at(mut self, at: DateTime<Utc>) -> Self {
        self.timeout_at = Some(at);
        self
    }
}

/// Severity of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What part of the engine produced a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Claim,
    Dispatch,
    Retry,
    DeadLetter,
    NodeExecution,
    Instance,
    Worker,
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claim => write!(f, "claim"),
            Self::Dispatch => write!(f, "dispatch"),
            Self::Retry => write!(f, "retry"),
            Self::DeadLetter => write!(f, "dead_letter"),
            Self::NodeExecution => write!(f, "node_execution"),
            Self::Instance => write!(f, "instance"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// Append-only record of one engine event
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: Uuid,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    pub instance_id: Option<Uuid>,
    pub node_instance_id: Option<Uuid>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A new journal entry to be appended
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    pub instance_id: Option<Uuid>,
    pub node_instance_id: Option<Uuid>,
    pub worker_id: Option<String>,
}

/// Merge a task result payload into an instance state bag
///
/// Later keys overwrite earlier ones; this is the only way state propagates
/// between nodes. Non-object payloads do not contribute keys.
pub fn merge_state(
    state: &mut serde_json::Map<String, serde_json::Value>,
    payload: &serde_json::Value,
) {
    if let Some(object) = payload.as_object() {
        for (key, value) in object {
            state.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&InstanceStatus::Waiting).unwrap();
        assert_eq!(json, "\"waiting\"");

        let parsed: TaskStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, TaskStatus::Pending);
    }

    #[test]
    fn test_instance_status_terminal() {
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Failed.is_terminal());
        assert!(!InstanceStatus::Running.is_terminal());
        assert!(!InstanceStatus::Waiting.is_terminal());
    }

    #[test]
    fn test_task_kind_as_str() {
        assert_eq!(TaskKind::DataOperation.as_str(), "data_operation");
        assert_eq!(TaskKind::Llm.to_string(), "llm");
    }

    #[test]
    fn test_merge_state_last_write_wins() {
        let mut state = serde_json::Map::new();
        merge_state(&mut state, &json!({"status": "open", "owner": "alice"}));
        merge_state(&mut state, &json!({"status": "approved"}));

        assert_eq!(state.get("status"), Some(&json!("approved")));
        assert_eq!(state.get("owner"), Some(&json!("alice")));
    }

    #[test]
    fn test_merge_state_ignores_non_objects() {
        let mut state = serde_json::Map::new();
        merge_state(&mut state, &json!({"key": "value"}));
        merge_state(&mut state, &json!("bare string"));

        assert_eq!(state.len(), 1);
        assert_eq!(state.get("key"), Some(&json!("value")));
    }

    #[test]
    fn test_new_task_builder() {
        let instance_id = Uuid::now_v7();
        let node_instance_id = Uuid::now_v7();
        let task = NewTask::new(
            instance_id,
            node_instance_id,
            TaskKind::Automated,
            "default",
            json!({}),
        )
        .with_priority(5)
        .with_max_retries(1);

        assert_eq!(task.queue, "default");
        assert_eq!(task.priority, 5);
        assert_eq!(task.max_retries, 1);
        assert!(task.scheduled_at.is_none());
    }
}
