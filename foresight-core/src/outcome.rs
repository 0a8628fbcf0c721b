//! Structured action outcomes
//!
//! An [`Outcome`] is a flat JSON object with a `status` classifier and any
//! number of auxiliary fields. Only `status` is examined by the engine; the
//! payload is passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Status classifier of an outcome
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutcomeStatus {
    /// The action did what was asked
    Success,

    /// The action reported a logical failure
    Error,

    /// Domain-specific status value
    Other(String),
}

impl OutcomeStatus {
    /// Wire representation of this status
    pub fn as_str(&self) -> &str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Error => "error",
            OutcomeStatus::Other(s) => s,
        }
    }

    /// Whether this is the success status
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Success)
    }
}

impl From<String> for OutcomeStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "success" => OutcomeStatus::Success,
            "error" => OutcomeStatus::Error,
            _ => OutcomeStatus::Other(s),
        }
    }
}

impl From<&str> for OutcomeStatus {
    fn from(s: &str) -> Self {
        OutcomeStatus::from(s.to_string())
    }
}

impl From<OutcomeStatus> for String {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Status classifier
    pub status: OutcomeStatus,

    /// Auxiliary fields, opaque to the engine
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Outcome {
    /// Create an outcome with the given status and no payload
    pub fn new(status: impl Into<OutcomeStatus>) -> Self {
        Self {
            status: status.into(),
            payload: Map::new(),
        }
    }

    /// Create a success outcome
    pub fn success() -> Self {
        Self::new(OutcomeStatus::Success)
    }

    /// Create an error outcome
    pub fn error() -> Self {
        Self::new(OutcomeStatus::Error)
    }

    /// Add an auxiliary field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        // `status` is reserved for the classifier
        let key = key.into();
        if key != "status" {
            self.payload.insert(key, value);
        }
        self
    }

    /// Check if this outcome is a success
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether two outcomes agree on status, ignoring payload
    pub fn matches(&self, other: &Outcome) -> bool {
        self.status == other.status
    }

    /// Look up an auxiliary field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Render as a JSON value
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.payload.len() + 1);
        map.insert("status".to_string(), Value::String(self.status.to_string()));
        for (k, v) in &self.payload {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::success()
    }
}
