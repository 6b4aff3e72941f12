//! Engine core: workflow advancement and the retry/dead-letter controller

mod advancer;
mod outcome;

pub use advancer::{queues, select_transition, AdvanceResult, Advancer};
pub use outcome::{OutcomeController, OutcomeDecision};

use uuid::Uuid;

use crate::definition::ValidationError;
use crate::persistence::StoreError;

/// Errors from engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Graph failed publish-time validation
    #[error("invalid workflow graph: {0}")]
    InvalidGraph(#[from] ValidationError),

    /// A transition pointed at a node the graph does not contain
    #[error("unknown node: {0}")]
    UnknownNode(Uuid),

    /// An instance has no current node to advance from
    #[error("instance {0} has no current node")]
    NoCurrentNode(Uuid),

    /// A definition has no unique entry node
    #[error("definition {0} has no unique entry node")]
    NoEntryNode(Uuid),
}
