//! Message definitions for the broker
//!
//! `Message` is the unit routed by the broker. It is immutable once built:
//! fields are private and only readable, so a component that needs a
//! different message constructs a new one.
//!
//! Notes on fields:
//! - `topic`: exact-match routing key, never empty
//! - `payload`: any JSON value; the wire codec decides how it is encoded
//! - `headers`: string to string mapping, possibly empty

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::utils::{Error, Result};

pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    topic: Arc<str>,
    payload: Value,
    headers: Headers,
}

impl Message {
    /// Build a message, rejecting an empty or whitespace-containing topic.
    pub fn new(topic: &str, payload: Value, headers: Headers) -> Result<Self> {
        validate_topic(topic)?;
        Ok(Self {
            topic: Arc::from(topic),
            payload,
            headers,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

/// Topics are opaque names, but they travel as one token on a command line,
/// so they cannot be empty or contain whitespace.
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() || topic.chars().any(char::is_whitespace) {
        return Err(Error::InvalidTopic(topic.to_string()));
    }
    Ok(())
}
