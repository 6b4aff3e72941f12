//! Comparison expressions for transition conditions
//!
//! Conditions are parsed into an explicit AST at publish time so malformed
//! expressions are rejected before they can strand an instance at runtime.

use serde::{Deserialize, Serialize};

/// Errors from parsing a comparison expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    /// Expression is empty or whitespace
    #[error("empty expression")]
    Empty,

    /// No comparison operator found
    #[error("no comparison operator in expression: {0}")]
    MissingOperator(String),

    /// Operator present but no field on the left side
    #[error("missing field before operator in expression: {0}")]
    MissingField(String),

    /// Operator present but no literal on the right side
    #[error("missing literal after operator in expression: {0}")]
    MissingLiteral(String),
}

/// Binary comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    /// Whether this operator compares numerically
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Ge | Self::Le)
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single binary comparison against a field in the state bag
///
/// # Example
///
/// ```
/// use caseflow_engine::definition::Comparison;
///
/// let cmp = Comparison::parse("amount >= 100").unwrap();
/// assert_eq!(cmp.field, "amount");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Field looked up in the state bag
    pub field: String,

    /// Comparison operator
    pub op: CompareOp,

    /// Right-hand literal, kept as written
    pub literal: String,
}

impl Comparison {
    /// Create a comparison directly
    pub fn new(field: impl Into<String>, op: CompareOp, literal: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            literal: literal.into(),
        }
    }

    /// Parse an expression of the form `field <op> literal`
    ///
    /// Two-character operators are matched before their one-character
    /// prefixes, so `>=` never parses as `>` followed by `=...`.
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ConditionError::Empty);
        }

        const OPERATORS: [(&str, CompareOp); 6] = [
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            (">=", CompareOp::Ge),
            ("<=", CompareOp::Le),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
        ];

        for (symbol, op) in OPERATORS {
            if let Some(index) = input.find(symbol) {
                let field = input[..index].trim();
                let literal = input[index + symbol.len()..].trim();

                if field.is_empty() {
                    return Err(ConditionError::MissingField(input.to_string()));
                }
                if literal.is_empty() {
                    return Err(ConditionError::MissingLiteral(input.to_string()));
                }

                return Ok(Self::new(field, op, literal));
            }
        }

        Err(ConditionError::MissingOperator(input.to_string()))
    }

    /// Evaluate against a state bag
    ///
    /// Numeric operators require both sides to parse as numbers; otherwise
    /// the condition is not satisfied. Equality operators compare the
    /// stringified state value. A missing field is never satisfied.
    pub fn evaluate(&self, state: &serde_json::Map<String, serde_json::Value>) -> bool {
        let Some(value) = state.get(&self.field).map(stringify) else {
            return false;
        };

        if self.op.is_numeric() {
            let (Ok(left), Ok(right)) = (value.parse::<f64>(), self.literal.parse::<f64>())
            else {
                return false;
            };
            return match self.op {
                CompareOp::Gt => left > right,
                CompareOp::Lt => left < right,
                CompareOp::Ge => left >= right,
                CompareOp::Le => left <= right,
                _ => unreachable!(),
            };
        }

        match self.op {
            CompareOp::Eq => value == self.literal,
            CompareOp::Ne => value != self.literal,
            _ => unreachable!(),
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.literal)
    }
}

/// Render a JSON scalar the way expression literals are written
pub(crate) fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
