//! EngineStore trait definition

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::definition::WorkflowGraph;
use crate::model::{
    InstanceStatus, LogEntry, NewLogEntry, NewNodeInstance, NewTask, NodeInstance, Task,
    WorkflowInstance,
};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Workflow instance not found
    #[error("instance not found: {0}")]
    InstanceNotFound(Uuid),

    /// Node instance not found
    #[error("node instance not found: {0}")]
    NodeInstanceNotFound(Uuid),

    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Workflow definition version not found
    #[error("definition not found: {definition_id} v{version}")]
    DefinitionNotFound { definition_id: Uuid, version: i32 },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Filter for listing dead-lettered tasks
#[derive(Debug, Clone, Default)]
pub struct DeadLetterFilter {
    pub instance_id: Option<Uuid>,
    pub queue: Option<String>,
}

/// Pagination parameters
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// One atomic advancement of a workflow instance
///
/// The advancer computes what should happen; the store applies it in a
/// single transaction so an instance can never be observed half-advanced.
#[derive(Debug, Clone)]
pub enum AdvanceCommand {
    /// The instance reached an end node
    CompleteInstance {
        instance_id: Uuid,
        state: serde_json::Map<String, serde_json::Value>,
        output: serde_json::Value,
    },

    /// The instance failed terminally (e.g. no routable transition)
    FailInstance {
        instance_id: Uuid,
        state: serde_json::Map<String, serde_json::Value>,
        error: String,
    },

    /// The instance enters the next node: state bag updated, a node
    /// instance inserted (sequence derived inside the transaction), and
    /// its task enqueued. The task's `node_instance_id` is replaced with
    /// the id of the inserted node instance.
    EnterNode {
        instance_id: Uuid,
        state: serde_json::Map<String, serde_json::Value>,
        instance_status: InstanceStatus,
        node_instance: NewNodeInstance,
        task: NewTask,
    },
}

/// Persistence contract for the engine
///
/// Implementations must be thread-safe and support concurrent access; the
/// claim operation in particular must be a single atomic conditional
/// update, since it is the only mutual-exclusion mechanism between
/// competing workers.
#[async_trait]
pub trait EngineStore: Send + Sync + 'static {
    // =========================================================================
    // Definition Operations (read-only)
    // =========================================================================

    /// Load a published definition version
    async fn get_graph(
        &self,
        definition_id: Uuid,
        version: i32,
    ) -> Result<WorkflowGraph, StoreError>;

    // =========================================================================
    // Instance Operations
    // =========================================================================

    /// Create a new running instance with the given initial state
    async fn create_instance(
        &self,
        definition_id: Uuid,
        version: i32,
        state: serde_json::Map<String, serde_json::Value>,
    ) -> Result<WorkflowInstance, StoreError>;

    /// Get an instance by id
    async fn get_instance(&self, id: Uuid) -> Result<WorkflowInstance, StoreError>;

    /// Apply one advancement atomically
    ///
    /// Returns the created task for [`AdvanceCommand::EnterNode`].
    async fn apply_advance(&self, command: AdvanceCommand) -> Result<Option<Task>, StoreError>;

    /// Get a node instance by id
    async fn get_node_instance(&self, id: Uuid) -> Result<NodeInstance, StoreError>;

    // =========================================================================
    // Task Queue Operations
    // =========================================================================

    /// Enqueue a task outside of advancement (entry tasks, requeues)
    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError>;

    /// Get a task by id
    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError>;

    /// Claim the next eligible task, if any
    ///
    /// Eligible means: not soft-deleted, not dead-lettered, queue in the
    /// worker's set, due (`scheduled_at` null or past), and either Pending
    /// with no live lock or Running with an expired lease (the previous
    /// claimant died mid-task). Ordered by ascending priority, then
    /// ascending `scheduled_at ?? created_at`. On a match the row is moved
    /// to Running with the lock set and `retry_count` incremented, all in
    /// one atomic conditional update.
    async fn claim_next(
        &self,
        worker_id: &str,
        queues: &[String],
        lease: Duration,
    ) -> Result<Option<Task>, StoreError>;

    /// Complete a task: store its output, clear the lock, and mark the
    /// owning node instance completed
    async fn complete_task(
        &self,
        task_id: Uuid,
        output: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Reschedule a failed task for retry: back to Pending with the lock
    /// cleared and a future `scheduled_at`
    async fn reschedule_task(
        &self,
        task_id: Uuid,
        error: &str,
        next_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Dead-letter a task: Failed + dead-letter stamp, and the owning node
    /// instance marked Failed. The instance is left untouched so other
    /// branches and human intervention remain possible.
    async fn dead_letter_task(&self, task_id: Uuid, reason: &str) -> Result<(), StoreError>;

    /// List dead-lettered tasks
    async fn list_dead_letters(
        &self,
        filter: DeadLetterFilter,
        pagination: Pagination,
    ) -> Result<Vec<Task>, StoreError>;

    // =========================================================================
    // Journal Operations
    // =========================================================================

    /// Append an execution log entry (append-only, never updated)
    async fn append_log(&self, entry: NewLogEntry) -> Result<(), StoreError>;

    /// List log entries for an instance, oldest first
    async fn list_logs(&self, instance_id: Uuid) -> Result<Vec<LogEntry>, StoreError>;
}
