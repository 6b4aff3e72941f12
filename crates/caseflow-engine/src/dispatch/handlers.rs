//! Built-in action handlers
//!
//! Node configuration payloads are decoded here, at the dispatcher
//! boundary; a payload that does not fit its task kind's schema fails the
//! task rather than flowing through the engine untyped.

use serde_json::json;
use tracing::{debug, info};

use super::collaborators::{ActionOutcome, Collaborators};
use crate::definition::{AutomatedAction, NodeConfig, NodeKind};
use crate::model::Task;
use crate::reliability::CircuitBreakerError;

pub(super) async fn automated(task: &Task, collab: &Collaborators) -> ActionOutcome {
    let action = match NodeConfig::decode(NodeKind::Automated, &task.input) {
        Ok(NodeConfig::Automated(action)) => action,
        Ok(_) => return ActionOutcome::fail("automated task carried non-automated config"),
        Err(e) => return ActionOutcome::fail(e.to_string()),
    };

    match action {
        AutomatedAction::Log { message } => {
            info!(task_id = %task.id, "{}", message);
            ActionOutcome::ok(json!({ "logged": message }))
        }

        AutomatedAction::UpdateEntity {
            entity,
            entity_id,
            fields,
        } => match &collab.entities {
            Some(client) => client.update(&entity, &entity_id, &fields).await,
            None => ActionOutcome::fail("no entity client configured"),
        },

        AutomatedAction::SendEmail { to, subject, body } => match &collab.notifications {
            Some(sender) => {
                sender
                    .send("email", &subject, &json!({ "to": to, "body": body }))
                    .await
            }
            None => ActionOutcome::fail("no notification sender configured"),
        },

        AutomatedAction::Webhook { url, method, body } => {
            webhook(collab, &url, &method, &body).await
        }
    }
}

/// Webhook calls go through the circuit breaker when one is wired, so a
/// failing downstream is given time to recover instead of burning the
/// whole retry budget against it.
async fn webhook(
    collab: &Collaborators,
    url: &str,
    method: &str,
    body: &serde_json::Value,
) -> ActionOutcome {
    let Some(caller) = &collab.webhooks else {
        return ActionOutcome::fail("no webhook caller configured");
    };

    match &collab.breaker {
        Some(breaker) => {
            let result = breaker
                .call(async {
                    let outcome = caller.call(url, method, body).await;
                    if outcome.success {
                        Ok(outcome)
                    } else {
                        Err(outcome)
                    }
                })
                .await;

            match result {
                Ok(outcome) => outcome,
                Err(CircuitBreakerError::Open) => {
                    ActionOutcome::fail(format!("webhook circuit open for {url}"))
                }
                Err(CircuitBreakerError::Inner(outcome)) => outcome,
            }
        }
        None => caller.call(url, method, body).await,
    }
}

/// The delay was already enforced by the task's `scheduled_at`; firing the
/// timer is just completing it.
pub(super) async fn timer(task: &Task) -> ActionOutcome {
    debug!(task_id = %task.id, "timer fired");
    ActionOutcome::ok(json!({ "fired": true }))
}

/// Completes immediately; a real deployment would block on an external
/// signal before the task is enqueued.
pub(super) async fn event(task: &Task) -> ActionOutcome {
    debug!(task_id = %task.id, "event passed through");
    ActionOutcome::ok(json!({ "received": true }))
}

pub(super) async fn llm(task: &Task, collab: &Collaborators, llm_enabled: bool) -> ActionOutcome {
    let config = match NodeConfig::decode(NodeKind::LlmAction, &task.input) {
        Ok(NodeConfig::Llm(config)) => config,
        Ok(_) => return ActionOutcome::fail("llm task carried non-llm config"),
        Err(e) => return ActionOutcome::fail(e.to_string()),
    };

    if config.prompt.trim().is_empty() {
        return ActionOutcome::fail("llm prompt is empty");
    }

    if !llm_enabled {
        return ActionOutcome::fail("llm actions are disabled on this worker");
    }

    let Some(api) = &collab.completion else {
        return ActionOutcome::fail("no completion client configured");
    };

    let outcome = api.complete(&config.prompt, config.model.as_deref()).await;
    if outcome.success {
        return outcome;
    }

    // A configured fallback turns a degraded completion API into a
    // successful result instead of a dead-lettered workflow.
    match config.fallback_action {
        Some(fallback) => {
            debug!(task_id = %task.id, fallback, "completion call failed, using fallback action");
            ActionOutcome::ok(json!({
                "fallbackAction": fallback,
                "llmError": outcome.error,
            }))
        }
        None => outcome,
    }
}

pub(super) async fn notification(task: &Task, collab: &Collaborators) -> ActionOutcome {
    let config = match NodeConfig::decode(NodeKind::Notification, &task.input) {
        Ok(NodeConfig::Notification(config)) => config,
        Ok(_) => return ActionOutcome::fail("notification task carried wrong config"),
        Err(e) => return ActionOutcome::fail(e.to_string()),
    };

    match &collab.notifications {
        Some(sender) => {
            sender
                .send(&config.channel, &config.template, &task.input)
                .await
        }
        None => ActionOutcome::fail("no notification sender configured"),
    }
}

pub(super) async fn integration(task: &Task, collab: &Collaborators) -> ActionOutcome {
    let config = match NodeConfig::decode(NodeKind::Integration, &task.input) {
        Ok(NodeConfig::Integration(config)) => config,
        Ok(_) => return ActionOutcome::fail("integration task carried wrong config"),
        Err(e) => return ActionOutcome::fail(e.to_string()),
    };

    match &collab.integrations {
        Some(client) => {
            client
                .execute(&config.system, &config.operation, &task.input)
                .await
        }
        None => ActionOutcome::fail("no integration client configured"),
    }
}

pub(super) async fn data_operation(task: &Task, collab: &Collaborators) -> ActionOutcome {
    let config = match NodeConfig::decode(NodeKind::DataOperation, &task.input) {
        Ok(NodeConfig::DataOperation(config)) => config,
        Ok(_) => return ActionOutcome::fail("data operation task carried wrong config"),
        Err(e) => return ActionOutcome::fail(e.to_string()),
    };

    match &collab.integrations {
        Some(client) => client.execute("data", &config.operation, &task.input).await,
        None => ActionOutcome::fail("no integration client configured"),
    }
}

pub(super) async fn bulk_import(task: &Task, collab: &Collaborators) -> ActionOutcome {
    let config = match NodeConfig::decode(NodeKind::BulkImport, &task.input) {
        Ok(NodeConfig::BulkImport(config)) => config,
        Ok(_) => return ActionOutcome::fail("bulk import task carried wrong config"),
        Err(e) => return ActionOutcome::fail(e.to_string()),
    };

    match &collab.bulk_imports {
        Some(importer) => importer.run(&config.source, &task.input).await,
        None => ActionOutcome::fail("no bulk importer configured"),
    }
}
