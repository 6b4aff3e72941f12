//! Workflow definitions: immutable, versioned graphs of nodes and
//! conditional transitions
//!
//! Definitions are authored elsewhere and referenced read-only by the
//! engine. [`WorkflowGraph::validate`] runs at publish time so structural
//! problems (dangling edges, unreachable exits, ambiguous defaults) are
//! caught before any instance can stall on them.

mod condition;
mod config;
mod node;
mod transition;

pub use condition::{CompareOp, Comparison, ConditionError};
pub use config::{
    wait_minutes, AutomatedAction, BulkImportConfig, ConfigError, DataOperationConfig,
    EventConfig, HumanConfig, IntegrationConfig, LlmConfig, NodeConfig, NotificationConfig,
    DEFAULT_WAIT_MINUTES,
};
pub use node::{Node, NodeKind};
pub use transition::{FieldEquals, Transition, TransitionCondition};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors from validating a workflow graph
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Graph has no nodes
    #[error("graph has no nodes")]
    Empty,

    /// Two nodes share an id
    #[error("duplicate node id: {0}")]
    DuplicateNode(Uuid),

    /// A transition references a node that does not exist
    #[error("transition {transition} references unknown node {node}")]
    UnknownNode { transition: Uuid, node: Uuid },

    /// A non-end node has no way out
    #[error("node {0} has no outgoing transitions and is not an end node")]
    DeadEnd(Uuid),

    /// More than one default transition out of the same node
    #[error("node {0} has multiple default transitions")]
    MultipleDefaults(Uuid),

    /// Graph has no end node
    #[error("graph has no end node")]
    NoEndNode,

    /// Graph must have exactly one entry node (no incoming transitions)
    #[error("graph has {0} entry nodes, expected exactly one")]
    AmbiguousEntry(usize),
}

/// An immutable, versioned workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub definition_id: Uuid,
    pub version: i32,
    pub name: String,
    pub nodes: Vec<Node>,
    pub transitions: Vec<Transition>,
}

impl WorkflowGraph {
    /// Create a graph
    pub fn new(
        definition_id: Uuid,
        version: i32,
        name: impl Into<String>,
        nodes: Vec<Node>,
        transitions: Vec<Transition>,
    ) -> Self {
        Self {
            definition_id,
            version,
            name: name.into(),
            nodes,
            transitions,
        }
    }

    /// Look up a node by id
    pub fn node(&self, id: Uuid) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing transitions of a node, sorted by ascending priority
    pub fn transitions_from(&self, node_id: Uuid) -> Vec<&Transition> {
        let mut out: Vec<&Transition> = self
            .transitions
            .iter()
            .filter(|t| t.from_node == node_id)
            .collect();
        out.sort_by_key(|t| t.priority);
        out
    }

    /// The entry node: the unique node with no incoming transitions
    pub fn entry_node(&self) -> Option<&Node> {
        let targets: HashSet<Uuid> = self.transitions.iter().map(|t| t.to_node).collect();
        let mut entries = self.nodes.iter().filter(|n| !targets.contains(&n.id));
        let first = entries.next();
        if entries.next().is_some() {
            return None;
        }
        first
    }

    /// Validate structural health at publish time
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.nodes.is_empty() {
            return Err(ValidationError::Empty);
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(ValidationError::DuplicateNode(node.id));
            }
        }

        for transition in &self.transitions {
            for endpoint in [transition.from_node, transition.to_node] {
                if !ids.contains(&endpoint) {
                    return Err(ValidationError::UnknownNode {
                        transition: transition.id,
                        node: endpoint,
                    });
                }
            }
        }

        if !self.nodes.iter().any(|n| n.is_end) {
            return Err(ValidationError::NoEndNode);
        }

        for node in &self.nodes {
            let outgoing = self.transitions_from(node.id);
            if outgoing.is_empty() && !node.is_end {
                return Err(ValidationError::DeadEnd(node.id));
            }
            if outgoing.iter().filter(|t| t.is_default).count() > 1 {
                return Err(ValidationError::MultipleDefaults(node.id));
            }
        }

        let targets: HashSet<Uuid> = self.transitions.iter().map(|t| t.to_node).collect();
        let entries = self.nodes.iter().filter(|n| !targets.contains(&n.id)).count();
        if entries != 1 {
            return Err(ValidationError::AmbiguousEntry(entries));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> WorkflowGraph {
        let start = Node::new(Uuid::now_v7(), "start", NodeKind::Automated);
        let end = Node::new(Uuid::now_v7(), "end", NodeKind::End);
        let transition = Transition::always(start.id, end.id, 1);

        WorkflowGraph::new(
            Uuid::now_v7(),
            1,
            "linear",
            vec![start, end],
            vec![transition],
        )
    }

    #[test]
    fn test_valid_linear_graph() {
        let graph = linear_graph();
        assert!(graph.validate().is_ok());
        assert_eq!(graph.entry_node().unwrap().name, "start");
    }

    #[test]
    fn test_transitions_sorted_by_priority() {
        let a = Node::new(Uuid::now_v7(), "a", NodeKind::Automated);
        let b = Node::new(Uuid::now_v7(), "b", NodeKind::End);
        let c = Node::new(Uuid::now_v7(), "c", NodeKind::End);

        let high = Transition::always(a.id, b.id, 5);
        let low = Transition::always(a.id, c.id, 1);

        let graph = WorkflowGraph::new(
            Uuid::now_v7(),
            1,
            "branch",
            vec![a.clone(), b, c],
            vec![high, low],
        );

        let out = graph.transitions_from(a.id);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].priority, 1);
        assert_eq!(out[1].priority, 5);
    }

    #[test]
    fn test_rejects_dangling_transition() {
        let mut graph = linear_graph();
        graph.transitions[0].to_node = Uuid::now_v7();
        assert!(matches!(
            graph.validate(),
            Err(ValidationError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_rejects_dead_end() {
        let a = Node::new(Uuid::now_v7(), "a", NodeKind::Automated);
        let b = Node::new(Uuid::now_v7(), "b", NodeKind::Automated);
        let end = Node::new(Uuid::now_v7(), "end", NodeKind::End);
        // b has no way out and is not an end node
        let t1 = Transition::always(a.id, b.id, 1);
        let t2 = Transition::always(a.id, end.id, 2);

        let graph = WorkflowGraph::new(Uuid::now_v7(), 1, "g", vec![a, b, end], vec![t1, t2]);
        assert!(matches!(graph.validate(), Err(ValidationError::DeadEnd(_))));
    }

    #[test]
    fn test_rejects_multiple_defaults() {
        let a = Node::new(Uuid::now_v7(), "a", NodeKind::Automated);
        let b = Node::new(Uuid::now_v7(), "b", NodeKind::End);
        let c = Node::new(Uuid::now_v7(), "c", NodeKind::End);

        let t1 = Transition::always(a.id, b.id, 1).default_edge();
        let t2 = Transition::always(a.id, c.id, 2).default_edge();

        let graph = WorkflowGraph::new(Uuid::now_v7(), 1, "g", vec![a.clone(), b, c], vec![t1, t2]);
        assert!(matches!(
            graph.validate(),
            Err(ValidationError::MultipleDefaults(id)) if id == a.id
        ));
    }

    #[test]
    fn test_rejects_missing_end_node() {
        let a = Node::new(Uuid::now_v7(), "a", NodeKind::Automated);
        let b = Node::new(Uuid::now_v7(), "b", NodeKind::Automated);
        let t1 = Transition::always(a.id, b.id, 1);
        let t2 = Transition::always(b.id, a.id, 1);

        let graph = WorkflowGraph::new(Uuid::now_v7(), 1, "loop", vec![a, b], vec![t1, t2]);
        assert!(matches!(graph.validate(), Err(ValidationError::NoEndNode)));
    }

    #[test]
    fn test_rejects_ambiguous_entry() {
        let a = Node::new(Uuid::now_v7(), "a", NodeKind::Automated);
        let b = Node::new(Uuid::now_v7(), "b", NodeKind::Automated);
        let end = Node::new(Uuid::now_v7(), "end", NodeKind::End);

        let t1 = Transition::always(a.id, end.id, 1);
        let t2 = Transition::always(b.id, end.id, 1);

        let graph = WorkflowGraph::new(Uuid::now_v7(), 1, "g", vec![a, b, end], vec![t1, t2]);
        assert!(matches!(
            graph.validate(),
            Err(ValidationError::AmbiguousEntry(2))
        ));
    }
}
