//! Workflow graph nodes

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::TaskKind;

/// What kind of work a node schedules when entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Engine-executed action (log, update-entity, send-email, webhook)
    Automated,

    /// Parked until a person completes the task through an external surface
    HumanTask,

    /// Parked until a configured delay elapses
    Timer,

    /// Alias for a timer-style pause configured in minutes
    Wait,

    /// Completes immediately; real deployments block on an external signal
    Event,

    /// Language-model completion call
    LlmAction,

    Notification,
    Integration,
    DataOperation,
    BulkImport,

    /// Terminal node; reaching it completes the instance
    End,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::HumanTask => "human_task",
            Self::Timer => "timer",
            Self::Wait => "wait",
            Self::Event => "event",
            Self::LlmAction => "llm_action",
            Self::Notification => "notification",
            Self::Integration => "integration",
            Self::DataOperation => "data_operation",
            Self::BulkImport => "bulk_import",
            Self::End => "end",
        }
    }

    /// The task kind scheduled when this node is entered
    ///
    /// End nodes never schedule a task.
    pub fn task_kind(&self) -> Option<TaskKind> {
        match self {
            Self::Automated => Some(TaskKind::Automated),
            Self::HumanTask => Some(TaskKind::Human),
            Self::Timer | Self::Wait => Some(TaskKind::Timer),
            Self::Event => Some(TaskKind::Event),
            Self::LlmAction => Some(TaskKind::Llm),
            Self::Notification => Some(TaskKind::Notification),
            Self::Integration => Some(TaskKind::Integration),
            Self::DataOperation => Some(TaskKind::DataOperation),
            Self::BulkImport => Some(TaskKind::BulkImport),
            Self::End => None,
        }
    }

    /// Whether entering this node parks the instance (human or timer wait)
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::HumanTask | Self::Timer | Self::Wait)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One vertex of a workflow graph, immutable once published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub name: String,
    pub kind: NodeKind,

    /// Raw configuration payload, decoded into a typed [`NodeConfig`]
    /// (see [`super::NodeConfig::decode`]) at the dispatcher boundary
    pub config: serde_json::Value,

    /// Retry budget for this node's tasks; values <= 0 fall back to the
    /// engine default
    pub max_retries: i32,

    /// Optional execution deadline for this node's tasks
    #[serde(default, with = "option_duration_secs")]
    pub timeout: Option<Duration>,

    /// Reaching a node with this flag completes the instance
    pub is_end: bool,
}

impl Node {
    /// Create a node with empty configuration
    pub fn new(id: Uuid, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            config: serde_json::Value::Object(serde_json::Map::new()),
            max_retries: 0,
            timeout: None,
            is_end: kind == NodeKind::End,
        }
    }

    /// Set the configuration payload
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the execution deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Serde support for Option<Duration> as whole seconds
mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_task_mapping() {
        assert_eq!(NodeKind::Automated.task_kind(), Some(TaskKind::Automated));
        assert_eq!(NodeKind::Wait.task_kind(), Some(TaskKind::Timer));
        assert_eq!(NodeKind::Timer.task_kind(), Some(TaskKind::Timer));
        assert_eq!(NodeKind::LlmAction.task_kind(), Some(TaskKind::Llm));
        assert_eq!(NodeKind::End.task_kind(), None);
    }

    #[test]
    fn test_waiting_kinds() {
        assert!(NodeKind::HumanTask.is_waiting());
        assert!(NodeKind::Wait.is_waiting());
        assert!(NodeKind::Timer.is_waiting());
        assert!(!NodeKind::Automated.is_waiting());
        assert!(!NodeKind::Event.is_waiting());
    }

    #[test]
    fn test_end_node_flag() {
        let node = Node::new(Uuid::now_v7(), "done", NodeKind::End);
        assert!(node.is_end);

        let node = Node::new(Uuid::now_v7(), "work", NodeKind::Automated);
        assert!(!node.is_end);
    }

    #[test]
    fn test_node_serialization() {
        let node = Node::new(Uuid::now_v7(), "review", NodeKind::HumanTask)
            .with_max_retries(1)
            .with_timeout(Duration::from_secs(600));

        let json = serde_json::to_string(&node).unwrap();
        let parsed: Node = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.kind, NodeKind::HumanTask);
        assert_eq!(parsed.timeout, Some(Duration::from_secs(600)));
    }
}
