//! The per-process claim loop
//!
//! Realizes the competing-consumers pattern: many worker processes, one
//! shared task store, no central dispatcher. Safety rests entirely on the
//! store's atomic conditional claim; the loop itself only budgets local
//! concurrency and keeps polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::dispatch::{DispatchResult, Dispatcher};
use crate::engine::OutcomeController;
use crate::journal::ExecutionJournal;
use crate::persistence::EngineStore;

/// How long the loop waits for a free permit before re-checking shutdown
const PERMIT_WAIT: Duration = Duration::from_millis(500);

/// Back-off after a store error so a flapping database is not hammered
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Claim loop status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimLoopStatus {
    /// Loop is claiming and dispatching
    Running,
    /// Shutdown signaled, draining in-flight tasks
    Draining,
    /// Loop has stopped
    Stopped,
}

/// Claim loop errors
#[derive(Debug, thiserror::Error)]
pub enum ClaimLoopError {
    /// Loop already running
    #[error("claim loop is already running")]
    AlreadyRunning,

    /// In-flight tasks did not drain before the timeout
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// Per-process polling loop that claims eligible tasks under a bounded
/// concurrency budget
///
/// # Example
///
/// ```ignore
/// let claim_loop = ClaimLoop::new(store, dispatcher, controller, journal, config);
/// claim_loop.start()?;
///
/// // ... later, graceful shutdown
/// claim_loop.shutdown().await?;
/// ```
pub struct ClaimLoop {
    store: Arc<dyn EngineStore>,
    dispatcher: Arc<Dispatcher>,
    controller: Arc<OutcomeController>,
    journal: ExecutionJournal,
    config: EngineConfig,
    permits: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    status: std::sync::RwLock<ClaimLoopStatus>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ClaimLoop {
    /// Create a claim loop
    pub fn new(
        store: Arc<dyn EngineStore>,
        dispatcher: Arc<Dispatcher>,
        controller: Arc<OutcomeController>,
        journal: ExecutionJournal,
        config: EngineConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks));

        Self {
            store,
            dispatcher,
            controller,
            journal,
            config,
            permits,
            shutdown_tx,
            shutdown_rx,
            status: std::sync::RwLock::new(ClaimLoopStatus::Stopped),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Start polling
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub fn start(&self) -> Result<(), ClaimLoopError> {
        {
            let status = *self.status.read().unwrap();
            if status == ClaimLoopStatus::Running {
                return Err(ClaimLoopError::AlreadyRunning);
            }
        }

        info!(
            worker_id = %self.config.worker_id,
            queues = ?self.config.queues,
            max_concurrent = self.config.max_concurrent_tasks,
            "starting claim loop"
        );

        *self.status.write().unwrap() = ClaimLoopStatus::Running;

        let store = Arc::clone(&self.store);
        let dispatcher = Arc::clone(&self.dispatcher);
        let controller = Arc::clone(&self.controller);
        let journal = self.journal.clone();
        let config = self.config.clone();
        let permits = Arc::clone(&self.permits);
        let shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            run_loop(
                store, dispatcher, controller, journal, config, permits, shutdown_rx,
            )
            .await;
        });

        *self.handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Current status
    pub fn status(&self) -> ClaimLoopStatus {
        *self.status.read().unwrap()
    }

    /// The worker identity this loop claims with
    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Number of tasks currently in flight
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrent_tasks - self.permits.available_permits()
    }

    /// Shut down gracefully: stop claiming, then wait for in-flight tasks
    /// to drain (up to the configured timeout)
    ///
    /// Tasks still running at the deadline are abandoned; their leases
    /// expire and a surviving worker picks them up.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn shutdown(&self) -> Result<(), ClaimLoopError> {
        {
            let status = *self.status.read().unwrap();
            if status == ClaimLoopStatus::Stopped {
                return Ok(());
            }
        }

        info!(worker_id = %self.config.worker_id, "initiating graceful shutdown");
        *self.status.write().unwrap() = ClaimLoopStatus::Draining;
        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            let available = self.permits.available_permits();
            if available == self.config.max_concurrent_tasks {
                debug!("all in-flight tasks drained");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining = self.config.max_concurrent_tasks - available,
                    "shutdown timeout reached, abandoning tasks to lease expiry"
                );
                *self.status.write().unwrap() = ClaimLoopStatus::Stopped;
                return Err(ClaimLoopError::ShutdownTimeout);
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        *self.status.write().unwrap() = ClaimLoopStatus::Stopped;
        info!(worker_id = %self.config.worker_id, "claim loop stopped");
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    store: Arc<dyn EngineStore>,
    dispatcher: Arc<Dispatcher>,
    controller: Arc<OutcomeController>,
    journal: ExecutionJournal,
    config: EngineConfig,
    permits: Arc<Semaphore>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            debug!("claim loop: shutdown requested");
            break;
        }

        // Wait for a free permit, but only briefly, so shutdown is
        // honored even while the process is saturated.
        let permit = tokio::select! {
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = tokio::time::sleep(PERMIT_WAIT) => continue,
            _ = shutdown_rx.changed() => break,
        };

        match store
            .claim_next(&config.worker_id, &config.queues, config.lease_duration)
            .await
        {
            Ok(Some(task)) => {
                journal.task_claimed(&task).await;

                // Dispatch asynchronously so the loop keeps polling; the
                // permit rides along and frees a slot when the task ends.
                let dispatcher = Arc::clone(&dispatcher);
                let controller = Arc::clone(&controller);
                let shutdown_rx = shutdown_rx.clone();

                tokio::spawn(async move {
                    let task_id = task.id;
                    match dispatcher.dispatch(&task, shutdown_rx).await {
                        DispatchResult::Finished(outcome) => {
                            // Persistence failures here are logged, not
                            // propagated: the lease expires and the task is
                            // re-claimed rather than crashing the worker.
                            if let Err(e) = controller.handle_outcome(&task, outcome).await {
                                error!(%task_id, "failed to record task outcome: {}", e);
                            }
                        }
                        DispatchResult::Cancelled => {
                            debug!(%task_id, "abandoned at shutdown, lease will expire");
                        }
                    }
                    drop(permit);
                });
            }

            Ok(None) => {
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }

            Err(e) => {
                drop(permit);
                error!("claim failed: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
        }
    }

    debug!("claim loop exited");
}
