//! External action collaborators
//!
//! Concrete action implementations live outside the engine; the dispatcher
//! depends only on these uniform request/result contracts. Every call
//! returns an [`ActionOutcome`] rather than an error type so a collaborator
//! failure flows into the retry controller like any other task failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::reliability::CircuitBreaker;

/// Uniform result of executing an action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
}

impl ActionOutcome {
    /// A successful outcome with the given result payload
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// A failed outcome with the given error message
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Outbound webhook caller
#[async_trait]
pub trait WebhookCaller: Send + Sync {
    async fn call(
        &self,
        url: &str,
        method: &str,
        body: &serde_json::Value,
    ) -> ActionOutcome;
}

/// Completion-API client (language-model calls)
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, prompt: &str, model: Option<&str>) -> ActionOutcome;
}

/// Notification dispatch (email, chat, push)
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        channel: &str,
        template: &str,
        payload: &serde_json::Value,
    ) -> ActionOutcome;
}

/// Business-record updates driven by automated actions
#[async_trait]
pub trait EntityClient: Send + Sync {
    async fn update(
        &self,
        entity: &str,
        entity_id: &str,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> ActionOutcome;
}

/// Calls into external systems (CRMs, ERPs, ...)
#[async_trait]
pub trait IntegrationClient: Send + Sync {
    async fn execute(
        &self,
        system: &str,
        operation: &str,
        payload: &serde_json::Value,
    ) -> ActionOutcome;
}

/// Bulk data import runner
#[async_trait]
pub trait BulkImporter: Send + Sync {
    async fn run(&self, source: &str, payload: &serde_json::Value) -> ActionOutcome;
}

/// The set of collaborators a dispatcher may be wired with
///
/// Everything is optional; a handler whose collaborator is absent fails the
/// task with a configuration error, except the circuit breaker, whose
/// absence simply means webhook calls go out directly.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub webhooks: Option<Arc<dyn WebhookCaller>>,
    pub completion: Option<Arc<dyn CompletionApi>>,
    pub notifications: Option<Arc<dyn NotificationSender>>,
    pub entities: Option<Arc<dyn EntityClient>>,
    pub integrations: Option<Arc<dyn IntegrationClient>>,
    pub bulk_imports: Option<Arc<dyn BulkImporter>>,
    pub breaker: Option<Arc<CircuitBreaker>>,
}

/// Webhook caller backed by reqwest
pub struct HttpWebhookCaller {
    client: reqwest::Client,
}

impl HttpWebhookCaller {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWebhookCaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookCaller for HttpWebhookCaller {
    async fn call(
        &self,
        url: &str,
        method: &str,
        body: &serde_json::Value,
    ) -> ActionOutcome {
        let method = match method.to_ascii_uppercase().parse::<reqwest::Method>() {
            Ok(m) => m,
            Err(_) => return ActionOutcome::fail(format!("invalid HTTP method: {method}")),
        };

        let response = self
            .client
            .request(method, url)
            .json(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                if status.is_success() {
                    ActionOutcome::ok(json!({
                        "status": status.as_u16(),
                        "body": text,
                    }))
                } else {
                    ActionOutcome::fail(format!("webhook returned {status}: {text}"))
                }
            }
            Err(e) => ActionOutcome::fail(format!("webhook call failed: {e}")),
        }
    }
}

/// No-op collaborators for wiring and tests
///
/// Each acknowledges the request without contacting anything.
pub mod noop {
    use super::*;

    pub struct NoopNotificationSender;

    #[async_trait]
    impl NotificationSender for NoopNotificationSender {
        async fn send(
            &self,
            channel: &str,
            template: &str,
            _payload: &serde_json::Value,
        ) -> ActionOutcome {
            debug!(channel, template, "notification acknowledged (noop)");
            ActionOutcome::ok(json!({ "channel": channel, "template": template }))
        }
    }

    pub struct NoopEntityClient;

    #[async_trait]
    impl EntityClient for NoopEntityClient {
        async fn update(
            &self,
            entity: &str,
            entity_id: &str,
            fields: &serde_json::Map<String, serde_json::Value>,
        ) -> ActionOutcome {
            debug!(entity, entity_id, "entity update acknowledged (noop)");
            ActionOutcome::ok(json!({
                "entity": entity,
                "entityId": entity_id,
                "updatedFields": fields.keys().cloned().collect::<Vec<_>>(),
            }))
        }
    }

    pub struct NoopIntegrationClient;

    #[async_trait]
    impl IntegrationClient for NoopIntegrationClient {
        async fn execute(
            &self,
            system: &str,
            operation: &str,
            _payload: &serde_json::Value,
        ) -> ActionOutcome {
            debug!(system, operation, "integration call acknowledged (noop)");
            ActionOutcome::ok(json!({ "system": system, "operation": operation }))
        }
    }

    pub struct NoopBulkImporter;

    #[async_trait]
    impl BulkImporter for NoopBulkImporter {
        async fn run(&self, source: &str, _payload: &serde_json::Value) -> ActionOutcome {
            debug!(source, "bulk import acknowledged (noop)");
            ActionOutcome::ok(json!({ "source": source, "imported": 0 }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let ok = ActionOutcome::ok(json!({"key": "value"}));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let fail = ActionOutcome::fail("boom");
        assert!(!fail.success);
        assert_eq!(fail.error.as_deref(), Some("boom"));
        assert!(fail.output.is_null());
    }

    #[tokio::test]
    async fn test_noop_notification_sender() {
        let sender = noop::NoopNotificationSender;
        let outcome = sender.send("email", "escalation", &json!({})).await;

        assert!(outcome.success);
        assert_eq!(outcome.output["channel"], "email");
    }

    #[tokio::test]
    async fn test_noop_entity_client_echoes_fields() {
        let client = noop::NoopEntityClient;
        let mut fields = serde_json::Map::new();
        fields.insert("status".to_string(), json!("closed"));

        let outcome = client.update("ticket", "T-100", &fields).await;
        assert!(outcome.success);
        assert_eq!(outcome.output["updatedFields"], json!(["status"]));
    }
}
