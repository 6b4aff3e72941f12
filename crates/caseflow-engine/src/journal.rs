//! Append-only execution journal
//!
//! Persists structured, timestamped engine events through the store. The
//! journal is observability, not control flow: a failed append is traced
//! and swallowed so it can never fail the work it describes.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::model::{LogCategory, LogLevel, NewLogEntry, Task};
use crate::persistence::EngineStore;

/// Store-backed execution journal bound to one worker identity
#[derive(Clone)]
pub struct ExecutionJournal {
    store: Arc<dyn EngineStore>,
    worker_id: String,
}

impl ExecutionJournal {
    /// Create a journal writing through the given store
    pub fn new(store: Arc<dyn EngineStore>, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            worker_id: worker_id.into(),
        }
    }

    /// The worker identity stamped onto entries
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Append one entry
    pub async fn log(
        &self,
        level: LogLevel,
        category: LogCategory,
        message: impl Into<String>,
        instance_id: Option<Uuid>,
        node_instance_id: Option<Uuid>,
    ) {
        let entry = NewLogEntry {
            level,
            category,
            message: message.into(),
            instance_id,
            node_instance_id,
            worker_id: Some(self.worker_id.clone()),
        };

        if let Err(e) = self.store.append_log(entry).await {
            warn!("failed to append journal entry: {}", e);
        }
    }

    pub async fn task_claimed(&self, task: &Task) {
        self.log(
            LogLevel::Debug,
            LogCategory::Claim,
            format!("claimed {} task {} from queue {}", task.kind, task.id, task.queue),
            Some(task.instance_id),
            Some(task.node_instance_id),
        )
        .await;
    }

    pub async fn task_completed(&self, task: &Task) {
        self.log(
            LogLevel::Info,
            LogCategory::Dispatch,
            format!("task {} completed", task.id),
            Some(task.instance_id),
            Some(task.node_instance_id),
        )
        .await;
    }

    pub async fn task_rescheduled(&self, task: &Task, error: &str, delay_secs: u64) {
        self.log(
            LogLevel::Warning,
            LogCategory::Retry,
            format!(
                "task {} failed (attempt {}/{}), retrying in {}s: {}",
                task.id, task.retry_count, task.max_retries, delay_secs, error
            ),
            Some(task.instance_id),
            Some(task.node_instance_id),
        )
        .await;
    }

    pub async fn task_dead_lettered(&self, task: &Task, reason: &str) {
        self.log(
            LogLevel::Error,
            LogCategory::DeadLetter,
            format!(
                "task {} dead-lettered after {} attempts: {}",
                task.id, task.retry_count, reason
            ),
            Some(task.instance_id),
            Some(task.node_instance_id),
        )
        .await;
    }

    pub async fn node_entered(&self, instance_id: Uuid, node_instance_id: Uuid, node_name: &str) {
        self.log(
            LogLevel::Info,
            LogCategory::NodeExecution,
            format!("entered node {}", node_name),
            Some(instance_id),
            Some(node_instance_id),
        )
        .await;
    }

    pub async fn instance_completed(&self, instance_id: Uuid) {
        self.log(
            LogLevel::Info,
            LogCategory::Instance,
            "instance completed",
            Some(instance_id),
            None,
        )
        .await;
    }

    pub async fn instance_failed(&self, instance_id: Uuid, error: &str) {
        self.log(
            LogLevel::Error,
            LogCategory::Instance,
            format!("instance failed: {}", error),
            Some(instance_id),
            None,
        )
        .await;
    }

    pub async fn transition_unroutable(&self, instance_id: Uuid, node_id: Uuid) {
        self.log(
            LogLevel::Error,
            LogCategory::Instance,
            format!("no matching transition out of node {}", node_id),
            Some(instance_id),
            None,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryEngineStore;

    #[tokio::test]
    async fn test_entries_carry_worker_id() {
        let store = Arc::new(InMemoryEngineStore::new());
        let journal = ExecutionJournal::new(store.clone(), "worker-7");
        let instance_id = Uuid::now_v7();

        journal
            .log(
                LogLevel::Info,
                LogCategory::Worker,
                "poll loop started",
                Some(instance_id),
                None,
            )
            .await;

        let logs = store.list_logs(instance_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].worker_id.as_deref(), Some("worker-7"));
        assert_eq!(logs[0].level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_instance_failed_entry() {
        let store = Arc::new(InMemoryEngineStore::new());
        let journal = ExecutionJournal::new(store.clone(), "worker-1");
        let instance_id = Uuid::now_v7();

        journal.instance_failed(instance_id, "no matching transition").await;

        let logs = store.list_logs(instance_id).await.unwrap();
        assert_eq!(logs[0].level, LogLevel::Error);
        assert!(logs[0].message.contains("no matching transition"));
    }
}
