//! PostgreSQL implementation of EngineStore
//!
//! Production persistence using PostgreSQL with:
//! - Single-row atomic task claiming via FOR UPDATE SKIP LOCKED
//! - Transactional advancement (instance + node instance + task in one commit)
//! - Node-instance sequence numbers derived inside the inserting transaction

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;
use crate::definition::{Node, NodeKind, Transition, TransitionCondition, WorkflowGraph};
use crate::model::{
    InstanceStatus, LogCategory, LogEntry, LogLevel, NewLogEntry, NewNodeInstance, NewTask,
    NodeInstance, NodeInstanceStatus, Task, TaskKind, TaskStatus, WorkflowInstance,
};

/// PostgreSQL implementation of EngineStore
///
/// Uses a connection pool for efficient database access. The claim
/// statement never blocks on rows held by other workers, so any number of
/// worker processes can poll the same queue.
///
/// # Example
///
/// ```ignore
/// use caseflow_engine::persistence::PostgresEngineStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/caseflow").await?;
/// let store = PostgresEngineStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresEngineStore {
    pool: PgPool,
}

impl PostgresEngineStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn fetch_sequence(
        tx: &mut Transaction<'_, Postgres>,
        instance_id: Uuid,
    ) -> Result<i32, StoreError> {
        // The caller has already updated (and therefore row-locked) the
        // instance, so concurrent advancement of the same instance
        // serializes here.
        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(sequence), 0) + 1 AS next_seq
            FROM caseflow_node_instances
            WHERE instance_id = $1
            "#,
        )
        .bind(instance_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.get::<i32, _>("next_seq"))
    }

    async fn update_instance_tx(
        tx: &mut Transaction<'_, Postgres>,
        instance_id: Uuid,
        state: &serde_json::Map<String, serde_json::Value>,
        status: InstanceStatus,
        current_node_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE caseflow_instances
            SET state = $2,
                status = $3,
                current_node_id = COALESCE($4, current_node_id)
            WHERE id = $1
            "#,
        )
        .bind(instance_id)
        .bind(serde_json::Value::Object(state.clone()))
        .bind(status.to_string())
        .bind(current_node_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(instance_id));
        }
        Ok(())
    }

    async fn insert_node_instance_tx(
        tx: &mut Transaction<'_, Postgres>,
        node_instance: &NewNodeInstance,
        sequence: i32,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO caseflow_node_instances (
                id, instance_id, node_id, status, sequence, input, started_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(id)
        .bind(node_instance.instance_id)
        .bind(node_instance.node_id)
        .bind(node_instance.status.to_string())
        .bind(sequence)
        .bind(&node_instance.input)
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(id)
    }

    async fn insert_task_tx(
        tx: &mut Transaction<'_, Postgres>,
        task: &NewTask,
        node_instance_id: Uuid,
    ) -> Result<Task, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO caseflow_tasks (
                id, instance_id, node_instance_id, kind, queue, priority,
                status, max_retries, scheduled_at, timeout_at, input, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9, $10, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(task.instance_id)
        .bind(node_instance_id)
        .bind(task.kind.as_str())
        .bind(&task.queue)
        .bind(task.priority)
        .bind(task.max_retries)
        .bind(task.scheduled_at)
        .bind(task.timeout_at)
        .bind(&task.input)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        task_from_row(&row)
    }
}

#[async_trait]
impl EngineStore for PostgresEngineStore {
    #[instrument(skip(self))]
    async fn get_graph(
        &self,
        definition_id: Uuid,
        version: i32,
    ) -> Result<WorkflowGraph, StoreError> {
        let definition = sqlx::query(
            r#"
            SELECT name FROM caseflow_definitions
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(definition_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load definition: {}", e);
            StoreError::Database(e.to_string())
        })?
        .ok_or(StoreError::DefinitionNotFound {
            definition_id,
            version,
        })?;

        let name: String = definition.get("name");

        let node_rows = sqlx::query(
            r#"
            SELECT id, name, kind, config, max_retries, timeout_secs, is_end
            FROM caseflow_nodes
            WHERE definition_id = $1 AND version = $2
            "#,
        )
        .bind(definition_id)
        .bind(version)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut nodes = Vec::with_capacity(node_rows.len());
        for row in node_rows {
            let kind: String = row.get("kind");
            let timeout_secs: Option<i64> = row.get("timeout_secs");
            nodes.push(Node {
                id: row.get("id"),
                name: row.get("name"),
                kind: parse_node_kind(&kind)?,
                config: row.get("config"),
                max_retries: row.get("max_retries"),
                timeout: timeout_secs.map(|s| Duration::from_secs(s.max(0) as u64)),
                is_end: row.get("is_end"),
            });
        }

        let transition_rows = sqlx::query(
            r#"
            SELECT id, from_node, to_node, condition, priority, is_default
            FROM caseflow_transitions
            WHERE definition_id = $1 AND version = $2
            "#,
        )
        .bind(definition_id)
        .bind(version)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut transitions = Vec::with_capacity(transition_rows.len());
        for row in transition_rows {
            let condition_json: serde_json::Value = row.get("condition");
            let condition: TransitionCondition = serde_json::from_value(condition_json)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            transitions.push(Transition {
                id: row.get("id"),
                from_node: row.get("from_node"),
                to_node: row.get("to_node"),
                condition,
                priority: row.get("priority"),
                is_default: row.get("is_default"),
            });
        }

        Ok(WorkflowGraph::new(
            definition_id,
            version,
            name,
            nodes,
            transitions,
        ))
    }

    #[instrument(skip(self, state))]
    async fn create_instance(
        &self,
        definition_id: Uuid,
        version: i32,
        state: serde_json::Map<String, serde_json::Value>,
    ) -> Result<WorkflowInstance, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO caseflow_instances (id, definition_id, version, status, state, created_at)
            VALUES ($1, $2, $3, 'running', $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(definition_id)
        .bind(version)
        .bind(serde_json::Value::Object(state))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create instance: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let instance = instance_from_row(&row)?;
        debug!(instance_id = %instance.id, %definition_id, "created instance");
        Ok(instance)
    }

    #[instrument(skip(self))]
    async fn get_instance(&self, id: Uuid) -> Result<WorkflowInstance, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM caseflow_instances WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or(StoreError::InstanceNotFound(id))?;

        instance_from_row(&row)
    }

    #[instrument(skip(self, command))]
    async fn apply_advance(&self, command: AdvanceCommand) -> Result<Option<Task>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let created = match command {
            AdvanceCommand::CompleteInstance {
                instance_id,
                state,
                output,
            } => {
                let result = sqlx::query(
                    r#"
                    UPDATE caseflow_instances
                    SET state = $2,
                        status = 'completed',
                        output = $3,
                        completed_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(instance_id)
                .bind(serde_json::Value::Object(state))
                .bind(&output)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::InstanceNotFound(instance_id));
                }

                debug!(%instance_id, "instance completed");
                None
            }

            AdvanceCommand::FailInstance {
                instance_id,
                state,
                error,
            } => {
                let result = sqlx::query(
                    r#"
                    UPDATE caseflow_instances
                    SET state = $2,
                        status = 'failed',
                        error = $3,
                        completed_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(instance_id)
                .bind(serde_json::Value::Object(state))
                .bind(&error)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::InstanceNotFound(instance_id));
                }

                debug!(%instance_id, "instance failed");
                None
            }

            AdvanceCommand::EnterNode {
                instance_id,
                state,
                instance_status,
                node_instance,
                task,
            } => {
                Self::update_instance_tx(
                    &mut tx,
                    instance_id,
                    &state,
                    instance_status,
                    Some(node_instance.node_id),
                )
                .await?;

                let sequence = Self::fetch_sequence(&mut tx, instance_id).await?;
                let node_instance_id =
                    Self::insert_node_instance_tx(&mut tx, &node_instance, sequence).await?;
                let task = Self::insert_task_tx(&mut tx, &task, node_instance_id).await?;

                debug!(
                    %instance_id,
                    node_id = %node_instance.node_id,
                    sequence,
                    task_id = %task.id,
                    "entered node"
                );
                Some(task)
            }
        };

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_node_instance(&self, id: Uuid) -> Result<NodeInstance, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM caseflow_node_instances WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or(StoreError::NodeInstanceNotFound(id))?;

        node_instance_from_row(&row)
    }

    #[instrument(skip(self, task))]
    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let created = Self::insert_task_tx(&mut tx, &task, task.node_instance_id).await?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(task_id = %created.id, kind = %created.kind, "enqueued task");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM caseflow_tasks WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or(StoreError::TaskNotFound(id))?;

        task_from_row(&row)
    }

    #[instrument(skip(self, queues))]
    async fn claim_next(
        &self,
        worker_id: &str,
        queues: &[String],
        lease: Duration,
    ) -> Result<Option<Task>, StoreError> {
        if queues.is_empty() {
            return Ok(None);
        }

        let lock_expires_at =
            Utc::now() + chrono::Duration::from_std(lease).unwrap_or_default();

        // SKIP LOCKED keeps competing workers from blocking on each other;
        // the CTE picks at most one eligible row and the UPDATE takes it in
        // the same statement, so two workers can never claim the same task.
        let row = sqlx::query(
            r#"
            WITH eligible AS (
                SELECT id
                FROM caseflow_tasks
                WHERE deleted_at IS NULL
                  AND is_dead_letter = FALSE
                  AND queue = ANY($1)
                  AND (scheduled_at IS NULL OR scheduled_at <= NOW())
                  AND (
                      (status = 'pending'
                       AND (lock_expires_at IS NULL OR lock_expires_at <= NOW()))
                      OR (status = 'running' AND lock_expires_at <= NOW())
                  )
                ORDER BY priority ASC, COALESCE(scheduled_at, created_at) ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE caseflow_tasks t
            SET status = 'running',
                locked_by = $2,
                lock_expires_at = $3,
                retry_count = retry_count + 1,
                picked_at = NOW()
            FROM eligible e
            WHERE t.id = e.id
            RETURNING t.*
            "#,
        )
        .bind(queues)
        .bind(worker_id)
        .bind(lock_expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to claim task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        match row {
            Some(row) => {
                let task = task_from_row(&row)?;
                debug!(worker_id, task_id = %task.id, queue = %task.queue, "claimed task");
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, output))]
    async fn complete_task(
        &self,
        task_id: Uuid,
        output: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let row = sqlx::query(
            r#"
            UPDATE caseflow_tasks
            SET status = 'completed',
                output = $2,
                locked_by = NULL,
                lock_expires_at = NULL,
                completed_at = NOW()
            WHERE id = $1
            RETURNING node_instance_id
            "#,
        )
        .bind(task_id)
        .bind(&output)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or(StoreError::TaskNotFound(task_id))?;

        let node_instance_id: Uuid = row.get("node_instance_id");

        sqlx::query(
            r#"
            UPDATE caseflow_node_instances
            SET status = 'completed',
                output = $2,
                finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(node_instance_id)
        .bind(&output)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(%task_id, "completed task");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reschedule_task(
        &self,
        task_id: Uuid,
        error: &str,
        next_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE caseflow_tasks
            SET status = 'pending',
                locked_by = NULL,
                lock_expires_at = NULL,
                scheduled_at = $3,
                error = $2
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(error)
        .bind(next_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(task_id));
        }

        debug!(%task_id, %next_at, "rescheduled task");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn dead_letter_task(&self, task_id: Uuid, reason: &str) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let row = sqlx::query(
            r#"
            UPDATE caseflow_tasks
            SET status = 'failed',
                locked_by = NULL,
                lock_expires_at = NULL,
                is_dead_letter = TRUE,
                dead_letter_reason = $2,
                dead_lettered_at = NOW(),
                error = $2
            WHERE id = $1
            RETURNING node_instance_id
            "#,
        )
        .bind(task_id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or(StoreError::TaskNotFound(task_id))?;

        let node_instance_id: Uuid = row.get("node_instance_id");

        sqlx::query(
            r#"
            UPDATE caseflow_node_instances
            SET status = 'failed',
                error = $2,
                finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(node_instance_id)
        .bind(reason)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(%task_id, reason, "dead-lettered task");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_dead_letters(
        &self,
        filter: DeadLetterFilter,
        pagination: Pagination,
    ) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM caseflow_tasks
            WHERE is_dead_letter = TRUE
              AND ($1::uuid IS NULL OR instance_id = $1)
              AND ($2::text IS NULL OR queue = $2)
            ORDER BY dead_lettered_at DESC
            OFFSET $3
            LIMIT $4
            "#,
        )
        .bind(filter.instance_id)
        .bind(&filter.queue)
        .bind(pagination.offset as i64)
        .bind(pagination.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter().map(task_from_row).collect()
    }

    #[instrument(skip(self, entry))]
    async fn append_log(&self, entry: NewLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO caseflow_execution_log (
                id, level, category, message, instance_id, node_instance_id,
                worker_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(entry.level.to_string())
        .bind(entry.category.to_string())
        .bind(&entry.message)
        .bind(entry.instance_id)
        .bind(entry.node_instance_id)
        .bind(&entry.worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to append log entry: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_logs(&self, instance_id: Uuid) -> Result<Vec<LogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM caseflow_execution_log
            WHERE instance_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter().map(log_from_row).collect()
    }
}

// Row mapping helpers

fn instance_from_row(row: &sqlx::postgres::PgRow) -> Result<WorkflowInstance, StoreError> {
    let status: String = row.get("status");
    let state: serde_json::Value = row.get("state");

    Ok(WorkflowInstance {
        id: row.get("id"),
        definition_id: row.get("definition_id"),
        version: row.get("version"),
        status: parse_instance_status(&status)?,
        current_node_id: row.get("current_node_id"),
        state: state.as_object().cloned().unwrap_or_default(),
        output: row.get("output"),
        error: row.get("error"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

fn node_instance_from_row(row: &sqlx::postgres::PgRow) -> Result<NodeInstance, StoreError> {
    let status: String = row.get("status");

    Ok(NodeInstance {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        node_id: row.get("node_id"),
        status: parse_node_instance_status(&status)?,
        sequence: row.get("sequence"),
        input: row.get("input"),
        output: row.get("output"),
        error: row.get("error"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    })
}

fn task_from_row(row: &sqlx::postgres::PgRow) -> Result<Task, StoreError> {
    let status: String = row.get("status");
    let kind: String = row.get("kind");

    Ok(Task {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        node_instance_id: row.get("node_instance_id"),
        kind: parse_task_kind(&kind)?,
        queue: row.get("queue"),
        priority: row.get("priority"),
        status: parse_task_status(&status)?,
        locked_by: row.get("locked_by"),
        lock_expires_at: row.get("lock_expires_at"),
        retry_count: row.get("retry_count"),
        max_retries: row.get("max_retries"),
        scheduled_at: row.get("scheduled_at"),
        picked_at: row.get("picked_at"),
        timeout_at: row.get("timeout_at"),
        is_dead_letter: row.get("is_dead_letter"),
        dead_letter_reason: row.get("dead_letter_reason"),
        dead_lettered_at: row.get("dead_lettered_at"),
        input: row.get("input"),
        output: row.get("output"),
        error: row.get("error"),
        error_detail: row.get("error_detail"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
        deleted_at: row.get("deleted_at"),
    })
}

fn log_from_row(row: &sqlx::postgres::PgRow) -> Result<LogEntry, StoreError> {
    let level: String = row.get("level");
    let category: String = row.get("category");

    Ok(LogEntry {
        id: row.get("id"),
        level: parse_log_level(&level)?,
        category: parse_log_category(&category)?,
        message: row.get("message"),
        instance_id: row.get("instance_id"),
        node_instance_id: row.get("node_instance_id"),
        worker_id: row.get("worker_id"),
        created_at: row.get("created_at"),
    })
}

fn parse_instance_status(status: &str) -> Result<InstanceStatus, StoreError> {
    match status {
        "running" => Ok(InstanceStatus::Running),
        "waiting" => Ok(InstanceStatus::Waiting),
        "completed" => Ok(InstanceStatus::Completed),
        "failed" => Ok(InstanceStatus::Failed),
        _ => Err(StoreError::Database(format!(
            "Unknown instance status: {}",
            status
        ))),
    }
}

fn parse_node_instance_status(status: &str) -> Result<NodeInstanceStatus, StoreError> {
    match status {
        "pending" => Ok(NodeInstanceStatus::Pending),
        "running" => Ok(NodeInstanceStatus::Running),
        "waiting" => Ok(NodeInstanceStatus::Waiting),
        "completed" => Ok(NodeInstanceStatus::Completed),
        "failed" => Ok(NodeInstanceStatus::Failed),
        _ => Err(StoreError::Database(format!(
            "Unknown node instance status: {}",
            status
        ))),
    }
}

fn parse_task_status(status: &str) -> Result<TaskStatus, StoreError> {
    match status {
        "pending" => Ok(TaskStatus::Pending),
        "running" => Ok(TaskStatus::Running),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        _ => Err(StoreError::Database(format!(
            "Unknown task status: {}",
            status
        ))),
    }
}

fn parse_task_kind(kind: &str) -> Result<TaskKind, StoreError> {
    match kind {
        "automated" => Ok(TaskKind::Automated),
        "human" => Ok(TaskKind::Human),
        "timer" => Ok(TaskKind::Timer),
        "event" => Ok(TaskKind::Event),
        "llm" => Ok(TaskKind::Llm),
        "notification" => Ok(TaskKind::Notification),
        "integration" => Ok(TaskKind::Integration),
        "data_operation" => Ok(TaskKind::DataOperation),
        "bulk_import" => Ok(TaskKind::BulkImport),
        _ => Err(StoreError::Database(format!("Unknown task kind: {}", kind))),
    }
}

fn parse_node_kind(kind: &str) -> Result<NodeKind, StoreError> {
    match kind {
        "automated" => Ok(NodeKind::Automated),
        "human_task" => Ok(NodeKind::HumanTask),
        "timer" => Ok(NodeKind::Timer),
        "wait" => Ok(NodeKind::Wait),
        "event" => Ok(NodeKind::Event),
        "llm_action" => Ok(NodeKind::LlmAction),
        "notification" => Ok(NodeKind::Notification),
        "integration" => Ok(NodeKind::Integration),
        "data_operation" => Ok(NodeKind::DataOperation),
        "bulk_import" => Ok(NodeKind::BulkImport),
        "end" => Ok(NodeKind::End),
        _ => Err(StoreError::Database(format!("Unknown node kind: {}", kind))),
    }
}

fn parse_log_level(level: &str) -> Result<LogLevel, StoreError> {
    match level {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warning" => Ok(LogLevel::Warning),
        "error" => Ok(LogLevel::Error),
        _ => Err(StoreError::Database(format!(
            "Unknown log level: {}",
            level
        ))),
    }
}

fn parse_log_category(category: &str) -> Result<LogCategory, StoreError> {
    match category {
        "claim" => Ok(LogCategory::Claim),
        "dispatch" => Ok(LogCategory::Dispatch),
        "retry" => Ok(LogCategory::Retry),
        "dead_letter" => Ok(LogCategory::DeadLetter),
        "node_execution" => Ok(LogCategory::NodeExecution),
        "instance" => Ok(LogCategory::Instance),
        "worker" => Ok(LogCategory::Worker),
        _ => Err(StoreError::Database(format!(
            "Unknown log category: {}",
            category
        ))),
    }
}

#[cfg(test)]
mod tests {
    // Integration coverage requires a PostgreSQL database; the in-memory
    // store exercises the same contract in crates/caseflow-engine/tests.
}
