//! Typed node configuration, decoded at the dispatcher boundary
//!
//! Node configuration is stored as an opaque JSON payload on the graph and
//! decoded into a variant keyed by the node kind when the matching handler
//! runs. Handlers therefore never pass untyped maps around; a payload that
//! does not fit its node kind's schema fails the task with a clear error.

use serde::{Deserialize, Serialize};

use super::node::NodeKind;

/// Errors from decoding a node configuration payload
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Payload does not match the schema for the node kind
    #[error("invalid {kind} configuration: {source}")]
    Invalid {
        kind: NodeKind,
        #[source]
        source: serde_json::Error,
    },
}

/// The automated action families, keyed by `actionType`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "actionType", rename_all = "camelCase")]
pub enum AutomatedAction {
    /// Emit a message into the execution journal
    #[serde(rename_all = "camelCase")]
    Log { message: String },

    /// Update fields on a business record
    #[serde(rename_all = "camelCase")]
    UpdateEntity {
        entity: String,
        entity_id: String,
        fields: serde_json::Map<String, serde_json::Value>,
    },

    /// Send an email
    #[serde(rename_all = "camelCase")]
    SendEmail {
        to: String,
        subject: String,
        body: String,
    },

    /// Call an outbound webhook
    #[serde(rename_all = "camelCase")]
    Webhook {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        body: serde_json::Value,
    },
}

fn default_method() -> String {
    "POST".to_string()
}

/// Language-model action configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    pub prompt: String,

    #[serde(default)]
    pub model: Option<String>,

    /// Returned as a successful result when the completion call fails, so a
    /// degraded upstream API does not dead-letter the workflow
    #[serde(default)]
    pub fallback_action: Option<String>,
}

/// Human task configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanConfig {
    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default)]
    pub form: Option<String>,
}

/// Notification configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub channel: String,
    pub template: String,
}

/// Integration call configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    pub system: String,
    pub operation: String,
}

/// Data operation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataOperationConfig {
    pub operation: String,
}

/// Bulk import configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportConfig {
    pub source: String,
}

/// Event configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfig {
    #[serde(default)]
    pub event_name: Option<String>,
}

/// Typed view of a node's configuration payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Automated(AutomatedAction),
    Human(HumanConfig),
    Wait { wait_minutes: i64 },
    Event(EventConfig),
    Llm(LlmConfig),
    Notification(NotificationConfig),
    Integration(IntegrationConfig),
    DataOperation(DataOperationConfig),
    BulkImport(BulkImportConfig),
    End,
}

/// Fallback pause when a wait node has no usable `waitMinutes`
pub const DEFAULT_WAIT_MINUTES: i64 = 60;

impl NodeConfig {
    /// Decode a raw payload for the given node kind
    pub fn decode(kind: NodeKind, raw: &serde_json::Value) -> Result<Self, ConfigError> {
        let invalid = |source| ConfigError::Invalid { kind, source };

        match kind {
            NodeKind::Automated => serde_json::from_value(raw.clone())
                .map(Self::Automated)
                .map_err(invalid),
            NodeKind::HumanTask => serde_json::from_value(raw.clone())
                .map(Self::Human)
                .map_err(invalid),
            NodeKind::Timer | NodeKind::Wait => Ok(Self::Wait {
                wait_minutes: wait_minutes(raw),
            }),
            NodeKind::Event => serde_json::from_value(raw.clone())
                .map(Self::Event)
                .map_err(invalid),
            NodeKind::LlmAction => serde_json::from_value(raw.clone())
                .map(Self::Llm)
                .map_err(invalid),
            NodeKind::Notification => serde_json::from_value(raw.clone())
                .map(Self::Notification)
                .map_err(invalid),
            NodeKind::Integration => serde_json::from_value(raw.clone())
                .map(Self::Integration)
                .map_err(invalid),
            NodeKind::DataOperation => serde_json::from_value(raw.clone())
                .map(Self::DataOperation)
                .map_err(invalid),
            NodeKind::BulkImport => serde_json::from_value(raw.clone())
                .map(Self::BulkImport)
                .map_err(invalid),
            NodeKind::End => Ok(Self::End),
        }
    }
}

/// Read `waitMinutes` leniently: absent or unparseable values fall back to
/// the default rather than failing the node.
pub fn wait_minutes(raw: &serde_json::Value) -> i64 {
    match raw.get("waitMinutes") {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(DEFAULT_WAIT_MINUTES),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(DEFAULT_WAIT_MINUTES),
        _ => DEFAULT_WAIT_MINUTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_automated_webhook() {
        let raw = json!({
            "actionType": "webhook",
            "url": "https://hooks.example.com/tickets",
            "body": {"event": "created"}
        });

        let config = NodeConfig::decode(NodeKind::Automated, &raw).unwrap();
        match config {
            NodeConfig::Automated(AutomatedAction::Webhook { url, method, .. }) => {
                assert_eq!(url, "https://hooks.example.com/tickets");
                assert_eq!(method, "POST");
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn test_decode_automated_rejects_unknown_action() {
        let raw = json!({"actionType": "teleport"});
        assert!(NodeConfig::decode(NodeKind::Automated, &raw).is_err());
    }

    #[test]
    fn test_decode_llm_with_fallback() {
        let raw = json!({
            "prompt": "Summarize the ticket",
            "fallbackAction": "route_to_human"
        });

        let config = NodeConfig::decode(NodeKind::LlmAction, &raw).unwrap();
        match config {
            NodeConfig::Llm(llm) => {
                assert_eq!(llm.prompt, "Summarize the ticket");
                assert_eq!(llm.fallback_action.as_deref(), Some("route_to_human"));
                assert!(llm.model.is_none());
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn test_wait_minutes_defaults() {
        assert_eq!(wait_minutes(&json!({})), DEFAULT_WAIT_MINUTES);
        assert_eq!(wait_minutes(&json!({"waitMinutes": "soon"})), DEFAULT_WAIT_MINUTES);
        assert_eq!(wait_minutes(&json!({"waitMinutes": 15})), 15);
        assert_eq!(wait_minutes(&json!({"waitMinutes": "45"})), 45);
    }

    #[test]
    fn test_decode_wait_never_fails() {
        let config = NodeConfig::decode(NodeKind::Wait, &json!({"junk": true})).unwrap();
        assert_eq!(
            config,
            NodeConfig::Wait {
                wait_minutes: DEFAULT_WAIT_MINUTES
            }
        );
    }

    #[test]
    fn test_automated_action_serialization() {
        let action = AutomatedAction::SendEmail {
            to: "ops@example.com".to_string(),
            subject: "Escalation".to_string(),
            body: "A ticket needs attention".to_string(),
        };

        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"actionType\":\"sendEmail\""));

        let parsed: AutomatedAction = serde_json::from_str(&json).unwrap();
        assert_eq!(action, parsed);
    }
}
