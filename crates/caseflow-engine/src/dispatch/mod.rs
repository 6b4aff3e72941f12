//! Action dispatcher: routes claimed tasks to handlers keyed by task kind

mod collaborators;
mod handlers;

pub use collaborators::{
    noop, ActionOutcome, BulkImporter, Collaborators, CompletionApi, EntityClient,
    HttpWebhookCaller, IntegrationClient, NotificationSender, WebhookCaller,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::model::{Task, TaskKind};

/// Handler function type
pub type ActionHandler = Arc<
    dyn Fn(Task) -> std::pin::Pin<Box<dyn std::future::Future<Output = ActionOutcome> + Send>>
        + Send
        + Sync,
>;

/// What came out of dispatching a task
#[derive(Debug)]
pub enum DispatchResult {
    /// The handler ran to an outcome (success or failure)
    Finished(ActionOutcome),

    /// Shutdown interrupted the handler; the task is abandoned and its
    /// lease expiry re-admits it to the eligible pool
    Cancelled,
}

/// Registry mapping task kinds to handlers
///
/// Built-in handlers cover the engine's task families; `register_handler`
/// overrides or extends them. A kind with no handler completes as a
/// no-op success so the state machine never stalls on a missing handler -
/// a deliberate lenience, since no business state is invented.
pub struct Dispatcher {
    handlers: std::sync::RwLock<HashMap<TaskKind, ActionHandler>>,
}

impl Dispatcher {
    /// Create a dispatcher with the built-in handlers wired to the given
    /// collaborators
    pub fn new(collaborators: Collaborators, llm_enabled: bool) -> Self {
        let dispatcher = Self {
            handlers: std::sync::RwLock::new(HashMap::new()),
        };

        let collab = Arc::new(collaborators);

        {
            let collab = Arc::clone(&collab);
            dispatcher.register_handler(TaskKind::Automated, move |task| {
                let collab = Arc::clone(&collab);
                async move { handlers::automated(&task, &collab).await }
            });
        }

        dispatcher.register_handler(TaskKind::Timer, |task| async move {
            handlers::timer(&task).await
        });

        dispatcher.register_handler(TaskKind::Event, |task| async move {
            handlers::event(&task).await
        });

        {
            let collab = Arc::clone(&collab);
            dispatcher.register_handler(TaskKind::Llm, move |task| {
                let collab = Arc::clone(&collab);
                async move { handlers::llm(&task, &collab, llm_enabled).await }
            });
        }

        {
            let collab = Arc::clone(&collab);
            dispatcher.register_handler(TaskKind::Notification, move |task| {
                let collab = Arc::clone(&collab);
                async move { handlers::notification(&task, &collab).await }
            });
        }

        {
            let collab = Arc::clone(&collab);
            dispatcher.register_handler(TaskKind::Integration, move |task| {
                let collab = Arc::clone(&collab);
                async move { handlers::integration(&task, &collab).await }
            });
        }

        {
            let collab = Arc::clone(&collab);
            dispatcher.register_handler(TaskKind::DataOperation, move |task| {
                let collab = Arc::clone(&collab);
                async move { handlers::data_operation(&task, &collab).await }
            });
        }

        {
            let collab = Arc::clone(&collab);
            dispatcher.register_handler(TaskKind::BulkImport, move |task| {
                let collab = Arc::clone(&collab);
                async move { handlers::bulk_import(&task, &collab).await }
            });
        }

        // TaskKind::Human is intentionally unregistered: human tasks are
        // claimed through the task surface, not engine workers.

        dispatcher
    }

    /// Register (or override) a handler for a task kind
    pub fn register_handler<F, Fut>(&self, kind: TaskKind, handler: F)
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ActionOutcome> + Send + 'static,
    {
        let handler: ActionHandler = Arc::new(move |task| Box::pin(handler(task)));
        self.handlers.write().unwrap().insert(kind, handler);
    }

    /// Execute a claimed task
    ///
    /// Handler failures become failure outcomes here; nothing a handler
    /// does propagates past this boundary. An execution deadline on the
    /// task (`timeout_at`) bounds the handler future, and the shutdown
    /// signal abandons it entirely.
    #[instrument(skip(self, task, shutdown), fields(task_id = %task.id, kind = %task.kind))]
    pub async fn dispatch(
        &self,
        task: &Task,
        mut shutdown: watch::Receiver<bool>,
    ) -> DispatchResult {
        let handler = self.handlers.read().unwrap().get(&task.kind).cloned();

        let Some(handler) = handler else {
            debug!(kind = %task.kind, "no handler registered, completing as no-op");
            return DispatchResult::Finished(ActionOutcome::ok(serde_json::json!({})));
        };

        let fut = handler(task.clone());

        let outcome = match task.timeout_at {
            Some(timeout_at) => {
                let remaining = (timeout_at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);

                tokio::select! {
                    result = tokio::time::timeout(remaining, fut) => match result {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(task_id = %task.id, "handler exceeded its deadline");
                            ActionOutcome::fail("task timed out")
                        }
                    },
                    _ = shutdown.changed() => return DispatchResult::Cancelled,
                }
            }
            None => {
                tokio::select! {
                    outcome = fut => outcome,
                    _ = shutdown.changed() => return DispatchResult::Cancelled,
                }
            }
        };

        DispatchResult::Finished(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewTask, TaskStatus};
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    fn task(kind: TaskKind, input: serde_json::Value) -> Task {
        let new = NewTask::new(Uuid::now_v7(), Uuid::now_v7(), kind, "default", input);
        Task {
            id: Uuid::now_v7(),
            instance_id: new.instance_id,
            node_instance_id: new.node_instance_id,
            kind: new.kind,
            queue: new.queue,
            priority: 0,
            status: TaskStatus::Running,
            locked_by: Some("worker-test".to_string()),
            lock_expires_at: None,
            retry_count: 1,
            max_retries: 3,
            scheduled_at: None,
            picked_at: None,
            timeout_at: None,
            is_dead_letter: false,
            dead_letter_reason: None,
            dead_lettered_at: None,
            input: new.input,
            output: None,
            error: None,
            error_detail: None,
            created_at: Utc::now(),
            completed_at: None,
            deleted_at: None,
        }
    }

    fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    struct StaticCompletion {
        outcome: ActionOutcome,
    }

    #[async_trait]
    impl CompletionApi for StaticCompletion {
        async fn complete(&self, _prompt: &str, _model: Option<&str>) -> ActionOutcome {
            self.outcome.clone()
        }
    }

    #[tokio::test]
    async fn test_timer_completes_as_noop() {
        let dispatcher = Dispatcher::new(Collaborators::default(), true);
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher
            .dispatch(&task(TaskKind::Timer, json!({})), shutdown_rx)
            .await;

        match result {
            DispatchResult::Finished(outcome) => assert!(outcome.success),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_noop_success() {
        let dispatcher = Dispatcher::new(Collaborators::default(), true);
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher
            .dispatch(&task(TaskKind::Human, json!({})), shutdown_rx)
            .await;

        match result {
            DispatchResult::Finished(outcome) => assert!(outcome.success),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_llm_requires_prompt() {
        let collaborators = Collaborators {
            completion: Some(Arc::new(StaticCompletion {
                outcome: ActionOutcome::ok(json!({"completion": "ok"})),
            })),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(collaborators, true);

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher
            .dispatch(&task(TaskKind::Llm, json!({"prompt": "  "})), shutdown_rx)
            .await;

        match result {
            DispatchResult::Finished(outcome) => {
                assert!(!outcome.success);
                assert!(outcome.error.unwrap().contains("prompt"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_llm_disabled_fails() {
        let collaborators = Collaborators {
            completion: Some(Arc::new(StaticCompletion {
                outcome: ActionOutcome::ok(json!({})),
            })),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(collaborators, false);

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher
            .dispatch(
                &task(TaskKind::Llm, json!({"prompt": "Summarize"})),
                shutdown_rx,
            )
            .await;

        match result {
            DispatchResult::Finished(outcome) => {
                assert!(!outcome.success);
                assert!(outcome.error.unwrap().contains("disabled"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_llm_fallback_turns_failure_into_success() {
        let collaborators = Collaborators {
            completion: Some(Arc::new(StaticCompletion {
                outcome: ActionOutcome::fail("upstream degraded"),
            })),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(collaborators, true);

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher
            .dispatch(
                &task(
                    TaskKind::Llm,
                    json!({"prompt": "Classify", "fallbackAction": "route_to_human"}),
                ),
                shutdown_rx,
            )
            .await;

        match result {
            DispatchResult::Finished(outcome) => {
                assert!(outcome.success);
                assert_eq!(outcome.output["fallbackAction"], "route_to_human");
                assert_eq!(outcome.output["llmError"], "upstream degraded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_llm_failure_without_fallback_stays_failed() {
        let collaborators = Collaborators {
            completion: Some(Arc::new(StaticCompletion {
                outcome: ActionOutcome::fail("upstream degraded"),
            })),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(collaborators, true);

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher
            .dispatch(
                &task(TaskKind::Llm, json!({"prompt": "Classify"})),
                shutdown_rx,
            )
            .await;

        match result {
            DispatchResult::Finished(outcome) => assert!(!outcome.success),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_automated_rejects_malformed_config() {
        let dispatcher = Dispatcher::new(Collaborators::default(), true);
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher
            .dispatch(
                &task(TaskKind::Automated, json!({"actionType": "teleport"})),
                shutdown_rx,
            )
            .await;

        match result {
            DispatchResult::Finished(outcome) => assert!(!outcome.success),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_custom_handler_overrides_builtin() {
        let dispatcher = Dispatcher::new(Collaborators::default(), true);
        dispatcher.register_handler(TaskKind::Timer, |_task| async move {
            ActionOutcome::ok(json!({"custom": true}))
        });

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher
            .dispatch(&task(TaskKind::Timer, json!({})), shutdown_rx)
            .await;

        match result {
            DispatchResult::Finished(outcome) => {
                assert_eq!(outcome.output["custom"], true);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_handler() {
        let dispatcher = Dispatcher::new(Collaborators::default(), true);
        dispatcher.register_handler(TaskKind::Automated, |_task| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ActionOutcome::ok(json!({}))
        });

        let (tx, rx) = watch::channel(false);
        let handle = {
            let dispatcher = Arc::new(dispatcher);
            let task = task(TaskKind::Automated, json!({}));
            tokio::spawn(async move { dispatcher.dispatch(&task, rx).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, DispatchResult::Cancelled));
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_task() {
        let dispatcher = Dispatcher::new(Collaborators::default(), true);
        dispatcher.register_handler(TaskKind::Automated, |_task| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ActionOutcome::ok(json!({}))
        });

        let mut slow_task = task(TaskKind::Automated, json!({}));
        slow_task.timeout_at = Some(Utc::now() + chrono::Duration::milliseconds(20));

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let result = dispatcher.dispatch(&slow_task, shutdown_rx).await;
        match result {
            DispatchResult::Finished(outcome) => {
                assert!(!outcome.success);
                assert!(outcome.error.unwrap().contains("timed out"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
