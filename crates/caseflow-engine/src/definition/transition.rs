//! Conditional edges between workflow nodes

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::condition::{stringify, Comparison};

/// A field that must equal a value (case-insensitive) in the state bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEquals {
    pub field: String,
    pub value: String,
}

impl FieldEquals {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// How a transition decides whether it is satisfied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionCondition {
    /// Satisfied unconditionally
    Always,

    /// A single binary comparison against the state bag
    Expression { expr: Comparison },

    /// All pairs must equal (case-insensitive) fields in the state bag
    FieldMatch { fields: Vec<FieldEquals> },

    /// Compared against the `userChoice` field of the task's own result
    /// payload, not the merged state
    UserChoice { choice: String },
}

/// A directed edge: evaluated in ascending priority order, first satisfied
/// wins; the `is_default` edge is the tie-breaking fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: Uuid,
    pub from_node: Uuid,
    pub to_node: Uuid,
    pub condition: TransitionCondition,
    pub priority: i32,
    pub is_default: bool,
}

impl Transition {
    /// Create an unconditional transition
    pub fn always(from_node: Uuid, to_node: Uuid, priority: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            from_node,
            to_node,
            condition: TransitionCondition::Always,
            priority,
            is_default: false,
        }
    }

    /// Create a transition with the given condition
    pub fn new(
        from_node: Uuid,
        to_node: Uuid,
        condition: TransitionCondition,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            from_node,
            to_node,
            condition,
            priority,
            is_default: false,
        }
    }

    /// Mark this transition as the fallback when nothing matches
    pub fn default_edge(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Evaluate this transition's condition
    ///
    /// `state` is the instance state bag after merging the completing
    /// task's result; `task_result` is that result payload itself, used
    /// only by `UserChoice`.
    pub fn is_satisfied(
        &self,
        state: &serde_json::Map<String, serde_json::Value>,
        task_result: &serde_json::Value,
    ) -> bool {
        match &self.condition {
            TransitionCondition::Always => true,

            TransitionCondition::Expression { expr } => expr.evaluate(state),

            TransitionCondition::FieldMatch { fields } => fields.iter().all(|pair| {
                state
                    .get(&pair.field)
                    .map(|v| stringify(v).eq_ignore_ascii_case(&pair.value))
                    .unwrap_or(false)
            }),

            TransitionCondition::UserChoice { choice } => task_result
                .get("userChoice")
                .map(|v| stringify(v) == *choice)
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_always_satisfied() {
        let t = Transition::always(Uuid::now_v7(), Uuid::now_v7(), 1);
        assert!(t.is_satisfied(&state(json!({})), &json!({})));
    }

    #[test]
    fn test_expression_condition() {
        let t = Transition::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            TransitionCondition::Expression {
                expr: Comparison::parse("score > 80").unwrap(),
            },
            1,
        );

        assert!(t.is_satisfied(&state(json!({"score": 90})), &json!({})));
        assert!(!t.is_satisfied(&state(json!({"score": 50})), &json!({})));
    }

    #[test]
    fn test_field_match_all_must_match() {
        let t = Transition::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            TransitionCondition::FieldMatch {
                fields: vec![
                    FieldEquals::new("status", "approved"),
                    FieldEquals::new("tier", "gold"),
                ],
            },
            1,
        );

        assert!(t.is_satisfied(
            &state(json!({"status": "approved", "tier": "gold"})),
            &json!({})
        ));
        assert!(!t.is_satisfied(
            &state(json!({"status": "approved", "tier": "silver"})),
            &json!({})
        ));
    }

    #[test]
    fn test_field_match_is_case_insensitive() {
        let t = Transition::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            TransitionCondition::FieldMatch {
                fields: vec![FieldEquals::new("status", "Approved")],
            },
            1,
        );

        assert!(t.is_satisfied(&state(json!({"status": "APPROVED"})), &json!({})));
    }

    #[test]
    fn test_user_choice_reads_task_result_not_state() {
        let t = Transition::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            TransitionCondition::UserChoice {
                choice: "escalate".to_string(),
            },
            1,
        );

        // Choice lives in the task result payload
        assert!(t.is_satisfied(&state(json!({})), &json!({"userChoice": "escalate"})));

        // A matching value in the state bag alone does not satisfy it
        assert!(!t.is_satisfied(&state(json!({"userChoice": "escalate"})), &json!({})));
    }

    #[test]
    fn test_condition_serialization() {
        let condition = TransitionCondition::Expression {
            expr: Comparison::parse("amount <= 500").unwrap(),
        };

        let json = serde_json::to_string(&condition).unwrap();
        assert!(json.contains("\"type\":\"expression\""));

        let parsed: TransitionCondition = serde_json::from_str(&json).unwrap();
        assert_eq!(condition, parsed);
    }
}
