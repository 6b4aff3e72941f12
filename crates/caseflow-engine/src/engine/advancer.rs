//! Workflow advancement: the state machine that moves an instance through
//! its graph after each successful task

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::EngineError;
use crate::definition::{wait_minutes, Node, NodeKind, Transition};
use crate::journal::ExecutionJournal;
use crate::model::{
    merge_state, InstanceStatus, NewNodeInstance, NewTask, NodeInstanceStatus, Task, TaskKind,
    WorkflowInstance,
};
use crate::persistence::{AdvanceCommand, EngineStore};

/// Queue names used by the engine
pub mod queues {
    /// Automated, timer, event, and adapter tasks
    pub const DEFAULT: &str = "default";

    /// Language-model tasks (often run by dedicated workers)
    pub const LLM: &str = "llm";

    /// Human tasks, claimed through the task surface rather than workers
    pub const HUMAN: &str = "human";
}

/// Select the transition to take out of a node
///
/// Pure function: transitions are evaluated in ascending priority order and
/// the first satisfied one wins; if none are satisfied the edge flagged as
/// default is taken; with no default there is nothing to take.
pub fn select_transition<'a>(
    transitions: &'a [&'a Transition],
    state: &serde_json::Map<String, serde_json::Value>,
    task_result: &serde_json::Value,
) -> Option<&'a Transition> {
    let mut ordered: Vec<&Transition> = transitions.to_vec();
    ordered.sort_by_key(|t| t.priority);

    ordered
        .iter()
        .find(|t| t.is_satisfied(state, task_result))
        .copied()
        .or_else(|| ordered.iter().find(|t| t.is_default).copied())
}

/// Where an advancement landed
#[derive(Debug)]
pub enum AdvanceResult {
    /// The instance reached an end node; output is the final task's result
    Completed { output: serde_json::Value },

    /// The instance failed terminally
    Failed { error: String },

    /// The instance entered the next node and its task was enqueued
    Entered { node_id: Uuid, task: Task },

    /// The instance was already in a terminal state; nothing to do
    AlreadyTerminal,
}

/// Drives workflow instances through their graphs
///
/// The advancer owns all instance mutation. It runs only while a task
/// belonging to the instance is being processed, so two workers never
/// write the same instance concurrently.
pub struct Advancer {
    store: Arc<dyn EngineStore>,
    journal: ExecutionJournal,
    default_max_retries: i32,
}

impl Advancer {
    /// Create an advancer
    pub fn new(
        store: Arc<dyn EngineStore>,
        journal: ExecutionJournal,
        default_max_retries: i32,
    ) -> Self {
        Self {
            store,
            journal,
            default_max_retries: default_max_retries.max(1),
        }
    }

    /// Start a new instance of a definition version
    ///
    /// Validates the graph, creates the instance, and enters the entry
    /// node (the unique node with no incoming transitions).
    #[instrument(skip(self, input))]
    pub async fn start_instance(
        &self,
        definition_id: Uuid,
        version: i32,
        input: serde_json::Value,
    ) -> Result<(WorkflowInstance, Option<Task>), EngineError> {
        let graph = self.store.get_graph(definition_id, version).await?;
        graph.validate()?;

        let entry = graph
            .entry_node()
            .ok_or(EngineError::NoEntryNode(definition_id))?;

        let mut state = serde_json::Map::new();
        merge_state(&mut state, &input);

        let instance = self
            .store
            .create_instance(definition_id, version, state.clone())
            .await?;

        info!(instance_id = %instance.id, entry = %entry.name, "starting instance");

        // A graph whose entry is already an end node completes immediately
        if entry.is_end {
            self.store
                .apply_advance(AdvanceCommand::CompleteInstance {
                    instance_id: instance.id,
                    state,
                    output: input,
                })
                .await?;
            self.journal.instance_completed(instance.id).await;
            let instance = self.store.get_instance(instance.id).await?;
            return Ok((instance, None));
        }

        let task = self
            .enter_node(instance.id, state, entry)
            .await?
            .ok_or(EngineError::UnknownNode(entry.id))?;

        self.journal
            .node_entered(instance.id, task.node_instance_id, &entry.name)
            .await;

        let instance = self.store.get_instance(instance.id).await?;
        Ok((instance, Some(task)))
    }

    /// Advance an instance after one of its tasks completed successfully
    #[instrument(skip(self, task, result), fields(instance_id = %task.instance_id))]
    pub async fn advance(
        &self,
        task: &Task,
        result: &serde_json::Value,
    ) -> Result<AdvanceResult, EngineError> {
        let mut instance = self.store.get_instance(task.instance_id).await?;

        if instance.status.is_terminal() {
            debug!(status = %instance.status, "instance already terminal");
            return Ok(AdvanceResult::AlreadyTerminal);
        }

        let graph = self
            .store
            .get_graph(instance.definition_id, instance.version)
            .await?;

        let current_node_id = instance
            .current_node_id
            .ok_or(EngineError::NoCurrentNode(instance.id))?;

        // The task result is the only way state crosses node boundaries
        merge_state(&mut instance.state, result);

        let outgoing = graph.transitions_from(current_node_id);
        let Some(transition) = select_transition(&outgoing, &instance.state, result) else {
            // Nothing routable and no default: fail loudly instead of
            // stranding the instance at this node forever.
            warn!(node_id = %current_node_id, "no matching transition");
            let error = format!("no matching transition out of node {current_node_id}");
            self.store
                .apply_advance(AdvanceCommand::FailInstance {
                    instance_id: instance.id,
                    state: instance.state.clone(),
                    error: error.clone(),
                })
                .await?;
            self.journal
                .transition_unroutable(instance.id, current_node_id)
                .await;
            return Ok(AdvanceResult::Failed { error });
        };

        let target = graph
            .node(transition.to_node)
            .ok_or(EngineError::UnknownNode(transition.to_node))?;

        if target.is_end {
            self.store
                .apply_advance(AdvanceCommand::CompleteInstance {
                    instance_id: instance.id,
                    state: instance.state.clone(),
                    output: result.clone(),
                })
                .await?;
            self.journal.instance_completed(instance.id).await;
            info!(instance_id = %instance.id, "instance completed");
            return Ok(AdvanceResult::Completed {
                output: result.clone(),
            });
        }

        let task = self
            .enter_node(instance.id, instance.state.clone(), target)
            .await?
            .ok_or(EngineError::UnknownNode(target.id))?;

        self.journal
            .node_entered(instance.id, task.node_instance_id, &target.name)
            .await;

        Ok(AdvanceResult::Entered {
            node_id: target.id,
            task,
        })
    }

    /// Enter a node: build the node instance + task per the node kind and
    /// apply them in one store transaction
    async fn enter_node(
        &self,
        instance_id: Uuid,
        state: serde_json::Map<String, serde_json::Value>,
        node: &Node,
    ) -> Result<Option<Task>, EngineError> {
        let now = Utc::now();

        let max_retries = if node.max_retries > 0 {
            node.max_retries
        } else {
            self.default_max_retries
        };

        let (instance_status, node_status, task) = match node.kind {
            NodeKind::HumanTask => {
                // No automatic retries: the task surface owns completion
                let task = NewTask::new(
                    instance_id,
                    Uuid::nil(),
                    TaskKind::Human,
                    queues::HUMAN,
                    node.config.clone(),
                )
                .with_max_retries(1);

                (InstanceStatus::Waiting, NodeInstanceStatus::Waiting, task)
            }

            NodeKind::Timer | NodeKind::Wait => {
                let minutes = wait_minutes(&node.config);
                let task = NewTask::new(
                    instance_id,
                    Uuid::nil(),
                    TaskKind::Timer,
                    queues::DEFAULT,
                    node.config.clone(),
                )
                .with_max_retries(max_retries)
                .with_scheduled_at(now + chrono::Duration::minutes(minutes));

                (InstanceStatus::Waiting, NodeInstanceStatus::Waiting, task)
            }

            NodeKind::End => return Ok(None),

            kind => {
                let task_kind = kind
                    .task_kind()
                    .ok_or(EngineError::UnknownNode(node.id))?;
                let queue = if task_kind == TaskKind::Llm {
                    queues::LLM
                } else {
                    queues::DEFAULT
                };

                let mut task = NewTask::new(
                    instance_id,
                    Uuid::nil(),
                    task_kind,
                    queue,
                    node.config.clone(),
                )
                .with_max_retries(max_retries);

                if let Some(timeout) = node.timeout {
                    task = task.with_timeout_at(
                        now + chrono::Duration::from_std(timeout).unwrap_or_default(),
                    );
                }

                (InstanceStatus::Running, NodeInstanceStatus::Running, task)
            }
        };

        let node_instance = NewNodeInstance {
            instance_id,
            node_id: node.id,
            status: node_status,
            input: serde_json::Value::Object(state.clone()),
        };

        let created = self
            .store
            .apply_advance(AdvanceCommand::EnterNode {
                instance_id,
                state,
                instance_status,
                node_instance,
                task,
            })
            .await?;

        Ok(created)
    }
}
