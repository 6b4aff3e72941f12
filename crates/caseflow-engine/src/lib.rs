//! # Caseflow Workflow Execution Engine
//!
//! A PostgreSQL-backed workflow execution engine for reliable, distributed
//! task execution over declarative node/transition graphs.
//!
//! ## Features
//!
//! - **Competing consumers**: any number of worker processes claim from one
//!   shared queue; a lease-based atomic claim is the only coordination
//! - **Automatic retries**: exponential backoff up to a per-node budget,
//!   then dead-lettering for human intervention
//! - **State-machine advancement**: conditional transitions evaluated in
//!   priority order over a merged per-instance state bag
//! - **Crash recovery**: an expired lease silently re-admits a task to the
//!   eligible pool - handlers must therefore tolerate re-execution
//! - **Execution journal**: append-only, structured engine events
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ClaimLoop                             │
//! │  (polls under a concurrency budget, claims with a lease)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                            │
//! │  (routes by task kind to handlers / collaborators)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     OutcomeController                        │
//! │  (complete / reschedule with backoff / dead-letter)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ on success
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Advancer                             │
//! │  (merge state, select transition, enter next node or end)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use caseflow_engine::prelude::*;
//!
//! let store: Arc<dyn EngineStore> = Arc::new(PostgresEngineStore::new(pool));
//! let config = EngineConfig::from_env();
//! let journal = ExecutionJournal::new(Arc::clone(&store), config.worker_id.clone());
//!
//! let dispatcher = Arc::new(Dispatcher::new(Collaborators::default(), config.llm_enabled));
//! let advancer = Advancer::new(Arc::clone(&store), journal.clone(), config.default_max_retries);
//! let controller = Arc::new(OutcomeController::new(
//!     Arc::clone(&store),
//!     advancer,
//!     RetryPolicy::new(config.base_retry_delay),
//!     journal.clone(),
//! ));
//!
//! let claim_loop = ClaimLoop::new(store, dispatcher, controller, journal, config);
//! claim_loop.start()?;
//! ```
//!
//! Human tasks are claimed through an external task surface rather than
//! engine workers; that surface reports completion by calling
//! [`OutcomeController::handle_outcome`] with the person's result payload.

pub mod config;
pub mod definition;
pub mod dispatch;
pub mod engine;
pub mod journal;
pub mod model;
pub mod persistence;
pub mod reliability;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::definition::{
        Comparison, Node, NodeConfig, NodeKind, Transition, TransitionCondition, WorkflowGraph,
    };
    pub use crate::dispatch::{
        ActionOutcome, Collaborators, DispatchResult, Dispatcher, HttpWebhookCaller,
    };
    pub use crate::engine::{
        select_transition, AdvanceResult, Advancer, EngineError, OutcomeController,
        OutcomeDecision,
    };
    pub use crate::journal::ExecutionJournal;
    pub use crate::model::{
        InstanceStatus, NodeInstanceStatus, Task, TaskKind, TaskStatus, WorkflowInstance,
    };
    pub use crate::persistence::{
        EngineStore, InMemoryEngineStore, PostgresEngineStore, StoreError,
    };
    pub use crate::reliability::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
    pub use crate::worker::{ClaimLoop, ClaimLoopError};
}

// Re-export key types at crate root
pub use config::EngineConfig;
pub use dispatch::{ActionOutcome, Collaborators, Dispatcher};
pub use engine::{AdvanceResult, Advancer, EngineError, OutcomeController};
pub use journal::ExecutionJournal;
pub use persistence::{EngineStore, InMemoryEngineStore, PostgresEngineStore, StoreError};
pub use reliability::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
pub use worker::ClaimLoop;
