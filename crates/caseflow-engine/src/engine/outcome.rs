//! Retry / dead-letter controller
//!
//! Every task outcome flows through here. Success hands control to the
//! advancer; failure either reschedules with exponential backoff or
//! dead-letters once the retry budget is spent.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::advancer::{AdvanceResult, Advancer};
use super::EngineError;
use crate::dispatch::ActionOutcome;
use crate::journal::ExecutionJournal;
use crate::model::Task;
use crate::persistence::EngineStore;
use crate::reliability::RetryPolicy;

/// What the controller decided for a task outcome
#[derive(Debug)]
pub enum OutcomeDecision {
    /// Task completed; the instance advanced (or finished)
    Completed(AdvanceResult),

    /// Task failed and was rescheduled with backoff
    Rescheduled { delay_secs: u64 },

    /// Task failed terminally and was dead-lettered
    DeadLettered,
}

/// Applies task outcomes to the store and drives advancement
pub struct OutcomeController {
    store: Arc<dyn EngineStore>,
    advancer: Advancer,
    retry: RetryPolicy,
    journal: ExecutionJournal,
}

impl OutcomeController {
    /// Create a controller
    pub fn new(
        store: Arc<dyn EngineStore>,
        advancer: Advancer,
        retry: RetryPolicy,
        journal: ExecutionJournal,
    ) -> Self {
        Self {
            store,
            advancer,
            retry,
            journal,
        }
    }

    /// Handle the outcome of an executed task
    ///
    /// The retry count was already incremented at claim time, so a task on
    /// its first failure carries `retry_count = 1` and waits the base delay.
    /// Dead-lettering marks the owning node instance failed but leaves the
    /// instance running: other branches may be unaffected and a person gets
    /// to decide what happens next.
    #[instrument(skip(self, task, outcome), fields(task_id = %task.id))]
    pub async fn handle_outcome(
        &self,
        task: &Task,
        outcome: ActionOutcome,
    ) -> Result<OutcomeDecision, EngineError> {
        if outcome.success {
            self.store
                .complete_task(task.id, outcome.output.clone())
                .await?;
            self.journal.task_completed(task).await;

            let advance = self.advancer.advance(task, &outcome.output).await?;
            return Ok(OutcomeDecision::Completed(advance));
        }

        let error = outcome
            .error
            .unwrap_or_else(|| "task failed without an error message".to_string());

        // retry_count counts this failed attempt too (incremented at claim),
        // so a budget of N allows N delayed retries before dead-lettering.
        if task.retry_count <= task.max_retries {
            let delay = self.retry.delay_for_retry(task.retry_count.max(1) as u32);
            let next_at =
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();

            self.store
                .reschedule_task(task.id, &error, next_at)
                .await?;
            self.journal
                .task_rescheduled(task, &error, delay.as_secs())
                .await;

            warn!(
                task_id = %task.id,
                attempt = task.retry_count,
                max = task.max_retries,
                delay_secs = delay.as_secs(),
                "task failed, rescheduled"
            );

            Ok(OutcomeDecision::Rescheduled {
                delay_secs: delay.as_secs(),
            })
        } else {
            self.store.dead_letter_task(task.id, &error).await?;
            self.journal.task_dead_lettered(task, &error).await;

            info!(
                task_id = %task.id,
                attempts = task.retry_count,
                "task dead-lettered, instance left for intervention"
            );

            Ok(OutcomeDecision::DeadLettered)
        }
    }
}
