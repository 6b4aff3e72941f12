//! In-memory implementation of EngineStore for testing
//!
//! Mirrors the PostgreSQL semantics, including lease expiry and claim
//! ordering, so the full engine can be exercised without a database. All
//! claim logic runs under a single write lock, which gives the same
//! at-most-one-claimant guarantee the SKIP LOCKED update provides.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;
use crate::definition::WorkflowGraph;
use crate::model::{
    InstanceStatus, LogEntry, NewLogEntry, NewNodeInstance, NewTask, NodeInstance,
    NodeInstanceStatus, Task, TaskStatus, WorkflowInstance,
};

/// In-memory implementation of EngineStore
///
/// # Example
///
/// ```
/// use caseflow_engine::persistence::InMemoryEngineStore;
///
/// let store = InMemoryEngineStore::new();
/// ```
pub struct InMemoryEngineStore {
    graphs: RwLock<HashMap<(Uuid, i32), WorkflowGraph>>,
    instances: RwLock<HashMap<Uuid, WorkflowInstance>>,
    node_instances: RwLock<HashMap<Uuid, NodeInstance>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
    logs: RwLock<Vec<LogEntry>>,
}

impl InMemoryEngineStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            graphs: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            node_instances: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            logs: RwLock::new(Vec::new()),
        }
    }

    /// Register a definition version (stands in for the authoring surface)
    pub fn insert_graph(&self, graph: WorkflowGraph) {
        self.graphs
            .write()
            .insert((graph.definition_id, graph.version), graph);
    }

    /// Number of tasks currently pending
    pub fn pending_task_count(&self) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    /// Number of dead-lettered tasks
    pub fn dead_letter_count(&self) -> usize {
        self.tasks.read().values().filter(|t| t.is_dead_letter).count()
    }

    /// Number of journal entries written
    pub fn log_count(&self) -> usize {
        self.logs.read().len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.instances.write().clear();
        self.node_instances.write().clear();
        self.tasks.write().clear();
        self.logs.write().clear();
    }

    fn build_task(task: NewTask, now: DateTime<Utc>) -> Task {
        Task {
            id: Uuid::now_v7(),
            instance_id: task.instance_id,
            node_instance_id: task.node_instance_id,
            kind: task.kind,
            queue: task.queue,
            priority: task.priority,
            status: TaskStatus::Pending,
            locked_by: None,
            lock_expires_at: None,
            retry_count: 0,
            max_retries: task.max_retries,
            scheduled_at: task.scheduled_at,
            picked_at: None,
            timeout_at: task.timeout_at,
            is_dead_letter: false,
            dead_letter_reason: None,
            dead_lettered_at: None,
            input: task.input,
            output: None,
            error: None,
            error_detail: None,
            created_at: now,
            completed_at: None,
            deleted_at: None,
        }
    }

    fn build_node_instance(
        node_instance: NewNodeInstance,
        sequence: i32,
        now: DateTime<Utc>,
    ) -> NodeInstance {
        NodeInstance {
            id: Uuid::now_v7(),
            instance_id: node_instance.instance_id,
            node_id: node_instance.node_id,
            status: node_instance.status,
            sequence,
            input: node_instance.input,
            output: None,
            error: None,
            started_at: now,
            finished_at: None,
        }
    }

    fn next_sequence(node_instances: &HashMap<Uuid, NodeInstance>, instance_id: Uuid) -> i32 {
        node_instances
            .values()
            .filter(|ni| ni.instance_id == instance_id)
            .map(|ni| ni.sequence)
            .max()
            .unwrap_or(0)
            + 1
    }
}

impl Default for InMemoryEngineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineStore for InMemoryEngineStore {
    async fn get_graph(
        &self,
        definition_id: Uuid,
        version: i32,
    ) -> Result<WorkflowGraph, StoreError> {
        self.graphs
            .read()
            .get(&(definition_id, version))
            .cloned()
            .ok_or(StoreError::DefinitionNotFound {
                definition_id,
                version,
            })
    }

    async fn create_instance(
        &self,
        definition_id: Uuid,
        version: i32,
        state: serde_json::Map<String, serde_json::Value>,
    ) -> Result<WorkflowInstance, StoreError> {
        let instance = WorkflowInstance {
            id: Uuid::now_v7(),
            definition_id,
            version,
            status: InstanceStatus::Running,
            current_node_id: None,
            state,
            output: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.instances.write().insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn get_instance(&self, id: Uuid) -> Result<WorkflowInstance, StoreError> {
        self.instances
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::InstanceNotFound(id))
    }

    async fn apply_advance(&self, command: AdvanceCommand) -> Result<Option<Task>, StoreError> {
        let now = Utc::now();

        match command {
            AdvanceCommand::CompleteInstance {
                instance_id,
                state,
                output,
            } => {
                let mut instances = self.instances.write();
                let instance = instances
                    .get_mut(&instance_id)
                    .ok_or(StoreError::InstanceNotFound(instance_id))?;

                instance.state = state;
                instance.status = InstanceStatus::Completed;
                instance.output = Some(output);
                instance.completed_at = Some(now);
                Ok(None)
            }

            AdvanceCommand::FailInstance {
                instance_id,
                state,
                error,
            } => {
                let mut instances = self.instances.write();
                let instance = instances
                    .get_mut(&instance_id)
                    .ok_or(StoreError::InstanceNotFound(instance_id))?;

                instance.state = state;
                instance.status = InstanceStatus::Failed;
                instance.error = Some(error);
                instance.completed_at = Some(now);
                Ok(None)
            }

            AdvanceCommand::EnterNode {
                instance_id,
                state,
                instance_status,
                node_instance,
                task,
            } => {
                // Take every lock up front so the whole advancement is
                // observed atomically, like the SQL transaction.
                let mut instances = self.instances.write();
                let mut node_instances = self.node_instances.write();
                let mut tasks = self.tasks.write();

                let instance = instances
                    .get_mut(&instance_id)
                    .ok_or(StoreError::InstanceNotFound(instance_id))?;

                let sequence = Self::next_sequence(&node_instances, instance_id);
                let node_instance = Self::build_node_instance(node_instance, sequence, now);

                instance.state = state;
                instance.status = instance_status;
                instance.current_node_id = Some(node_instance.node_id);

                let mut task = task;
                task.node_instance_id = node_instance.id;
                let task = Self::build_task(task, now);

                node_instances.insert(node_instance.id, node_instance);
                tasks.insert(task.id, task.clone());
                Ok(Some(task))
            }
        }
    }

    async fn get_node_instance(&self, id: Uuid) -> Result<NodeInstance, StoreError> {
        self.node_instances
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NodeInstanceNotFound(id))
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = Self::build_task(task, Utc::now());
        self.tasks.write().insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        self.tasks
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::TaskNotFound(id))
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        queues: &[String],
        lease: Duration,
    ) -> Result<Option<Task>, StoreError> {
        let now = Utc::now();
        let mut tasks = self.tasks.write();

        let eligible = |task: &Task| -> bool {
            if task.deleted_at.is_some() || task.is_dead_letter {
                return false;
            }
            if !queues.contains(&task.queue) {
                return false;
            }
            if let Some(at) = task.scheduled_at {
                if at > now {
                    return false;
                }
            }
            let lock_expired = task.lock_expires_at.map(|at| at <= now).unwrap_or(true);
            match task.status {
                TaskStatus::Pending => lock_expired,
                TaskStatus::Running => lock_expired,
                _ => false,
            }
        };

        let next_id = tasks
            .values()
            .filter(|t| eligible(t))
            .min_by_key(|t| (t.priority, t.scheduled_at.unwrap_or(t.created_at), t.id))
            .map(|t| t.id);

        let Some(id) = next_id else {
            return Ok(None);
        };

        let task = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        task.status = TaskStatus::Running;
        task.locked_by = Some(worker_id.to_string());
        task.lock_expires_at =
            Some(now + chrono::Duration::from_std(lease).unwrap_or_default());
        task.retry_count += 1;
        task.picked_at = Some(now);

        Ok(Some(task.clone()))
    }

    async fn complete_task(
        &self,
        task_id: Uuid,
        output: serde_json::Value,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        // Lock order matches apply_advance: node instances before tasks
        let mut node_instances = self.node_instances.write();
        let mut tasks = self.tasks.write();

        let task = tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;

        task.status = TaskStatus::Completed;
        task.output = Some(output.clone());
        task.locked_by = None;
        task.lock_expires_at = None;
        task.completed_at = Some(now);

        if let Some(node_instance) = node_instances.get_mut(&task.node_instance_id) {
            node_instance.status = NodeInstanceStatus::Completed;
            node_instance.output = Some(output);
            node_instance.finished_at = Some(now);
        }

        Ok(())
    }

    async fn reschedule_task(
        &self,
        task_id: Uuid,
        error: &str,
        next_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;

        task.status = TaskStatus::Pending;
        task.locked_by = None;
        task.lock_expires_at = None;
        task.scheduled_at = Some(next_at);
        task.error = Some(error.to_string());

        Ok(())
    }

    async fn dead_letter_task(&self, task_id: Uuid, reason: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut node_instances = self.node_instances.write();
        let mut tasks = self.tasks.write();

        let task = tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;

        task.status = TaskStatus::Failed;
        task.locked_by = None;
        task.lock_expires_at = None;
        task.is_dead_letter = true;
        task.dead_letter_reason = Some(reason.to_string());
        task.dead_lettered_at = Some(now);
        task.error = Some(reason.to_string());

        if let Some(node_instance) = node_instances.get_mut(&task.node_instance_id) {
            node_instance.status = NodeInstanceStatus::Failed;
            node_instance.error = Some(reason.to_string());
            node_instance.finished_at = Some(now);
        }

        Ok(())
    }

    async fn list_dead_letters(
        &self,
        filter: DeadLetterFilter,
        pagination: Pagination,
    ) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read();
        let mut entries: Vec<Task> = tasks
            .values()
            .filter(|t| t.is_dead_letter)
            .filter(|t| {
                filter
                    .instance_id
                    .map(|id| t.instance_id == id)
                    .unwrap_or(true)
            })
            .filter(|t| {
                filter
                    .queue
                    .as_ref()
                    .map(|q| &t.queue == q)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        entries.sort_by(|a, b| b.dead_lettered_at.cmp(&a.dead_lettered_at));

        Ok(entries
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn append_log(&self, entry: NewLogEntry) -> Result<(), StoreError> {
        self.logs.write().push(LogEntry {
            id: Uuid::now_v7(),
            level: entry.level,
            category: entry.category,
            message: entry.message,
            instance_id: entry.instance_id,
            node_instance_id: entry.node_instance_id,
            worker_id: entry.worker_id,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_logs(&self, instance_id: Uuid) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|e| e.instance_id == Some(instance_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskKind;
    use serde_json::json;

    fn new_task(queue: &str, priority: i32) -> NewTask {
        NewTask::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            TaskKind::Automated,
            queue,
            json!({}),
        )
        .with_priority(priority)
    }

    fn queues() -> Vec<String> {
        vec!["default".to_string()]
    }

    #[tokio::test]
    async fn test_claim_sets_lock_and_increments_retry_count() {
        let store = InMemoryEngineStore::new();
        let task = store.insert_task(new_task("default", 0)).await.unwrap();

        let claimed = store
            .claim_next("worker-1", &queues(), Duration::from_secs(60))
            .await
            .unwrap()
            .expect("task should be claimable");

        assert_eq!(claimed.id, task.id);
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.locked_by.as_deref(), Some("worker-1"));
        assert!(claimed.lock_expires_at.is_some());
        assert_eq!(claimed.retry_count, 1);
        assert!(claimed.picked_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_respects_queue_filter() {
        let store = InMemoryEngineStore::new();
        store.insert_task(new_task("llm", 0)).await.unwrap();

        let claimed = store
            .claim_next("worker-1", &queues(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_claim_orders_by_priority_then_age() {
        let store = InMemoryEngineStore::new();
        let low_priority = store.insert_task(new_task("default", 10)).await.unwrap();
        let high_priority = store.insert_task(new_task("default", 1)).await.unwrap();

        let first = store
            .claim_next("worker-1", &queues(), Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        let second = store
            .claim_next("worker-1", &queues(), Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, high_priority.id);
        assert_eq!(second.id, low_priority.id);
    }

    #[tokio::test]
    async fn test_claim_skips_future_scheduled_tasks() {
        let store = InMemoryEngineStore::new();
        let task = new_task("default", 0)
            .with_scheduled_at(Utc::now() + chrono::Duration::minutes(5));
        store.insert_task(task).await.unwrap();

        let claimed = store
            .claim_next("worker-1", &queues(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_claimed_task_is_not_reclaimable_while_leased() {
        let store = InMemoryEngineStore::new();
        store.insert_task(new_task("default", 0)).await.unwrap();

        store
            .claim_next("worker-1", &queues(), Duration::from_secs(900))
            .await
            .unwrap()
            .unwrap();

        let second = store
            .claim_next("worker-2", &queues(), Duration::from_secs(900))
            .await
            .unwrap();

        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let store = InMemoryEngineStore::new();
        store.insert_task(new_task("default", 0)).await.unwrap();

        // First worker claims with an already-elapsed lease
        let first = store
            .claim_next("worker-1", &queues(), Duration::ZERO)
            .await
            .unwrap()
            .unwrap();

        let second = store
            .claim_next("worker-2", &queues(), Duration::from_secs(900))
            .await
            .unwrap()
            .expect("expired lease should be reclaimable");

        assert_eq!(second.id, first.id);
        assert_eq!(second.locked_by.as_deref(), Some("worker-2"));
        assert_eq!(second.retry_count, 2);
    }

    #[tokio::test]
    async fn test_dead_letter_is_terminal() {
        let store = InMemoryEngineStore::new();
        let task = store.insert_task(new_task("default", 0)).await.unwrap();

        store
            .claim_next("worker-1", &queues(), Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        store.dead_letter_task(task.id, "exhausted").await.unwrap();

        let claimed = store
            .claim_next("worker-2", &queues(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(claimed.is_none());
        assert_eq!(store.dead_letter_count(), 1);

        let dead = store.get_task(task.id).await.unwrap();
        assert_eq!(dead.status, TaskStatus::Failed);
        assert_eq!(dead.dead_letter_reason.as_deref(), Some("exhausted"));
    }

    #[tokio::test]
    async fn test_reschedule_clears_lock_and_delays() {
        let store = InMemoryEngineStore::new();
        let task = store.insert_task(new_task("default", 0)).await.unwrap();

        store
            .claim_next("worker-1", &queues(), Duration::from_secs(900))
            .await
            .unwrap()
            .unwrap();

        let next_at = Utc::now() + chrono::Duration::seconds(30);
        store
            .reschedule_task(task.id, "transient failure", next_at)
            .await
            .unwrap();

        let rescheduled = store.get_task(task.id).await.unwrap();
        assert_eq!(rescheduled.status, TaskStatus::Pending);
        assert!(rescheduled.locked_by.is_none());
        assert_eq!(rescheduled.scheduled_at, Some(next_at));
        assert_eq!(rescheduled.error.as_deref(), Some("transient failure"));

        // Not yet claimable: scheduled in the future
        let claimed = store
            .claim_next("worker-2", &queues(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_row() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryEngineStore::new());
        store.insert_task(new_task("default", 0)).await.unwrap();

        let mut handles = vec![];
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .claim_next(
                        &format!("worker-{i}"),
                        &["default".to_string()],
                        Duration::from_secs(900),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_enter_node_derives_sequence() {
        let store = InMemoryEngineStore::new();
        let instance = store
            .create_instance(Uuid::now_v7(), 1, serde_json::Map::new())
            .await
            .unwrap();

        for expected_sequence in 1..=3 {
            let node_id = Uuid::now_v7();
            let task = store
                .apply_advance(AdvanceCommand::EnterNode {
                    instance_id: instance.id,
                    state: serde_json::Map::new(),
                    instance_status: InstanceStatus::Running,
                    node_instance: NewNodeInstance {
                        instance_id: instance.id,
                        node_id,
                        status: NodeInstanceStatus::Running,
                        input: json!({}),
                    },
                    task: NewTask::new(
                        instance.id,
                        Uuid::nil(),
                        TaskKind::Automated,
                        "default",
                        json!({}),
                    ),
                })
                .await
                .unwrap()
                .unwrap();

            let node_instance = store.get_node_instance(task.node_instance_id).await.unwrap();
            assert_eq!(node_instance.sequence, expected_sequence);

            let updated = store.get_instance(instance.id).await.unwrap();
            assert_eq!(updated.current_node_id, Some(node_id));
        }
    }

    #[tokio::test]
    async fn test_list_dead_letters_with_filter() {
        let store = InMemoryEngineStore::new();
        let instance_id = Uuid::now_v7();

        let dead = store
            .insert_task(
                NewTask::new(
                    instance_id,
                    Uuid::now_v7(),
                    TaskKind::Automated,
                    "default",
                    json!({}),
                ),
            )
            .await
            .unwrap();
        store.insert_task(new_task("default", 0)).await.unwrap();

        store.dead_letter_task(dead.id, "exhausted").await.unwrap();

        let all = store
            .list_dead_letters(DeadLetterFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, dead.id);

        let filtered = store
            .list_dead_letters(
                DeadLetterFilter {
                    instance_id: Some(Uuid::now_v7()),
                    queue: None,
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert!(filtered.is_empty());

        let by_instance = store
            .list_dead_letters(
                DeadLetterFilter {
                    instance_id: Some(instance_id),
                    queue: Some("default".to_string()),
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(by_instance.len(), 1);
    }

    #[tokio::test]
    async fn test_journal_append_and_list() {
        use crate::model::{LogCategory, LogLevel};

        let store = InMemoryEngineStore::new();
        let instance_id = Uuid::now_v7();

        store
            .append_log(NewLogEntry {
                level: LogLevel::Info,
                category: LogCategory::Claim,
                message: "claimed task".to_string(),
                instance_id: Some(instance_id),
                node_instance_id: None,
                worker_id: Some("worker-1".to_string()),
            })
            .await
            .unwrap();

        let logs = store.list_logs(instance_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].category, LogCategory::Claim);
    }
}
