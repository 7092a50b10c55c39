//! Minimal client for submitting approvals to a running gateway.
use crate::util::now_epoch_secs;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ureq::Agent;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response status and JSON body; non-2xx responses are returned, not raised.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: u16,
    pub body: Value,
}

impl ClientResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct ApprovalClient {
    agent: Agent,
    base_url: String,
    token: String,
}

impl ApprovalClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// POST `/approve` with a fresh timestamp and nonce.
    pub fn submit(&self, action: &str, data: Map<String, Value>) -> Result<ClientResponse> {
        let body = json!({
            "action": action,
            "data": data,
            "timestamp": now_epoch_secs()?,
            "nonce": fresh_nonce(),
        });
        self.post("/approve", &body)
    }

    /// POST `/process` to run a dispatch cycle now.
    pub fn process(&self) -> Result<ClientResponse> {
        self.post("/process", &json!({}))
    }

    fn post(&self, route: &str, body: &Value) -> Result<ClientResponse> {
        let url = format!("{}{route}", self.base_url);
        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send_json(body)
            .with_context(|| format!("POST {url}"))?;
        let status = response.status().as_u16();
        let body: Value = response
            .body_mut()
            .read_json()
            .map_err(|err| anyhow!("decode response from {url}: {err}"))?;
        Ok(ClientResponse { status, body })
    }
}

/// Nonce from the wall clock and pid; unique enough for one operator.
fn fresh_nonce() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("{nanos:x}{:x}", std::process::id())
}
