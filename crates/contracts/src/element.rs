//! Element - the tagged value flowing through the pipeline
//!
//! An element is a small type tag plus a heterogeneous key/value payload.
//! Rules pattern-match on the payload; the pipeline itself is polymorphic
//! over its shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Heterogeneous element payload
pub type Payload = Map<String, Value>;

/// A tagged payload flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Type tag (rule groups filter on it)
    pub tag: String,

    /// Key/value payload with heterogeneous values
    #[serde(default)]
    pub payload: Payload,
}

impl Element {
    /// Create an element with an empty payload
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: Payload::new(),
        }
    }

    /// Create an element from an existing payload
    pub fn with_payload(tag: impl Into<String>, payload: Payload) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Get a payload field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Get a payload field as a string slice
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Insert or overwrite a payload field
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }

    /// True when the payload contains `key`
    pub fn has(&self, key: &str) -> bool {
        self.payload.contains_key(key)
    }
}
