//! The consensus rule shared by both ends of a conversation.
//!
//! A channel only carries payloads that pass the rule, on write and on
//! delivery. Peers that disagree on the rule silently lose each other's
//! messages, so the rule is identified by an id that travels with every
//! envelope and receivers drop anything stamped with a different id.
//!
//! # Message shape
//!
//! ```text
//! { "text": <string>, "timestamp": <integer millis> }
//! ```
//!
//! No other top-level keys are allowed. The timestamp is any signed 64-bit
//! integer; it is not range checked.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields every message must carry.
pub const REQUIRED_FIELDS: [&str; 2] = ["text", "timestamp"];

/// A payload rejected by the consensus rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The value is not a JSON object.
    #[error("invalid message: expected an object, got {0}")]
    NotAnObject(&'static str),

    /// Shape mismatch: missing, disallowed, or mistyped fields.
    #[error("invalid message: {0}")]
    Shape(ShapeReport),
}

/// Which fields broke the message shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeReport {
    pub missing: Vec<String>,
    pub disallowed: Vec<String>,
    pub mistyped: Vec<String>,
}

impl ShapeReport {
    fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.disallowed.is_empty() && self.mistyped.is_empty()
    }
}

impl fmt::Display for ShapeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing {}", quoted(&self.missing)));
        }
        if !self.disallowed.is_empty() {
            parts.push(format!(
                "disallowed {} (only \"text\" and \"timestamp\" are allowed)",
                quoted(&self.disallowed)
            ));
        }
        if !self.mistyped.is_empty() {
            parts.push(format!("wrong type for {}", quoted(&self.mistyped)));
        }
        write!(f, "{}", parts.join("; "))
    }
}

fn quoted(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ")
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The message rule: exactly `text` (string) and `timestamp` (i64).
pub fn assert_message(value: &Value) -> Result<(), ValidationError> {
    let Value::Object(map) = value else {
        return Err(ValidationError::NotAnObject(kind_of(value)));
    };

    let mut report = ShapeReport::default();
    for field in REQUIRED_FIELDS {
        if !map.contains_key(field) {
            report.missing.push(field.to_string());
        }
    }
    for key in map.keys() {
        if !REQUIRED_FIELDS.contains(&key.as_str()) {
            report.disallowed.push(key.clone());
        }
    }
    if map.get("text").is_some_and(|v| !v.is_string()) {
        report.mistyped.push("text".to_string());
    }
    if map.get("timestamp").is_some_and(|v| !v.is_i64()) {
        report.mistyped.push("timestamp".to_string());
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(ValidationError::Shape(report))
    }
}

/// A consensus rule predicate.
pub type Rule = fn(&Value) -> Result<(), ValidationError>;

/// Consensus identity: the id both peers agree on plus the rule behind it.
#[derive(Clone)]
pub struct Consensus {
    id: String,
    rule: Rule,
}

impl Consensus {
    /// Consensus for chat messages under the given channel id.
    pub fn messages(id: impl Into<String>) -> Self {
        Self::with_rule(id, assert_message)
    }

    /// Consensus with a custom rule.
    pub fn with_rule(id: impl Into<String>, rule: Rule) -> Self {
        Self { id: id.into(), rule }
    }

    /// The consensus id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the rule.
    pub fn assert_valid(&self, value: &Value) -> Result<(), ValidationError> {
        (self.rule)(value)
    }

    /// Run the rule and decode an accepted value into a [`MessagePayload`].
    pub fn admit(&self, value: Value) -> Result<MessagePayload, ValidationError> {
        self.assert_valid(&value)?;
        serde_json::from_value(value).map_err(|_| {
            ValidationError::Shape(ShapeReport {
                mistyped: REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
                ..ShapeReport::default()
            })
        })
    }
}

impl fmt::Debug for Consensus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consensus").field("id", &self.id).finish()
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagePayload {
    /// Message text.
    pub text: String,
    /// Unix timestamp in milliseconds. Any `i64` is accepted, but integers
    /// outside that range fail the rule as mistyped.
    pub timestamp: i64,
}

impl MessagePayload {
    /// Create a message stamped with the current time.
    pub fn now(text: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Self {
            text: text.into(),
            timestamp,
        }
    }

    /// JSON form as written to the channel.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "text": self.text, "timestamp": self.timestamp })
    }
}
