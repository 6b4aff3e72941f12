//! Worker-side execution: the claim loop

mod claim_loop;

pub use claim_loop::{ClaimLoop, ClaimLoopError, ClaimLoopStatus};
