//! Persistence layer: the EngineStore trait and its implementations
//!
//! - `PostgresEngineStore` - production persistence
//! - `InMemoryEngineStore` - test double with identical semantics

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryEngineStore;
pub use postgres::PostgresEngineStore;
pub use store::{AdvanceCommand, DeadLetterFilter, EngineStore, Pagination, StoreError};
