use crate::paths::{APPROVAL_PREFIX, APPROVAL_SUFFIX};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const ENVELOPE_KEYS: [&str; 4] = ["action", "data", "timestamp", "nonce"];

/// The parts of an `/approve` body the gateway cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub action: String,
    pub data: Map<String, Value>,
    pub timestamp: Option<Value>,
    pub nonce: String,
}

impl ApprovalRequest {
    /// Parse a request body leniently.
    ///
    /// Non-object bodies yield an empty request (which the guard then rejects).
    /// Top-level fields outside the envelope are folded into `data` unless
    /// `data` already has that key.
    pub fn from_body(body: &Value) -> Self {
        let empty = Map::new();
        let object = body.as_object().unwrap_or(&empty);
        let action = object
            .get("action")
            .and_then(Value::as_str)
            .map(|action| action.trim().to_ascii_uppercase())
            .unwrap_or_default();
        let mut data = match object.get("data") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        for (key, value) in object {
            if ENVELOPE_KEYS.contains(&key.as_str()) {
                continue;
            }
            data.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let nonce = match object.get("nonce") {
            Some(Value::String(nonce)) => nonce.trim().to_string(),
            Some(Value::Number(number)) => number.to_string(),
            _ => String::new(),
        };
        Self {
            action,
            data,
            timestamp: object.get("timestamp").cloned(),
            nonce,
        }
    }
}

/// One accepted approval, written once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub action: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub timestamp: i64,
    pub nonce: String,
    #[serde(default)]
    pub remote: String,
    #[serde(default)]
    pub received_at: i64,
}

impl ApprovalRecord {
    pub fn new(request: ApprovalRequest, timestamp: i64, remote: &str, received_at: i64) -> Self {
        Self {
            action: request.action,
            data: request.data,
            timestamp,
            nonce: request.nonce,
            remote: remote.to_string(),
            received_at,
        }
    }

    /// `approve_<10-digit receive epoch>_<sanitized nonce>.json`; sorts chronologically.
    pub fn file_name(&self) -> String {
        format!(
            "{APPROVAL_PREFIX}{:010}_{}{APPROVAL_SUFFIX}",
            self.received_at.max(0),
            sanitize_nonce(&self.nonce)
        )
    }

    /// Payload field as text; numbers are accepted for ids like `7`.
    pub fn data_str(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

/// Replace anything outside `[A-Za-z0-9_-]` so the nonce is safe in a file name.
pub fn sanitize_nonce(nonce: &str) -> String {
    nonce
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
