//! Error taxonomy for the auth path and plan mutations.
//!
//! Auth errors are terminal for a request and carry the HTTP status they map
//! to. Plan errors are recovered by the dispatcher and attached to results.
use axum::http::StatusCode;
use serde_json::{json, Value};

/// Reasons a request is rejected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No bearer token configured on the server; the auth path fails closed.
    #[error("server token not configured")]
    ServerMisconfigured,

    /// Missing, malformed or wrong bearer token.
    #[error("bad bearer token: {0}")]
    BadToken(&'static str),

    /// Remote address outside every allowed CIDR block.
    #[error("remote {0} not in allow-list")]
    IpNotAllowed(String),

    /// Remote address could not be parsed as an IP.
    #[error("malformed remote address {0:?}")]
    BadRemote(String),

    /// Client timestamp outside the skew window.
    #[error("timestamp {ts} outside skew of {skew}s around {now}")]
    TimestampOutOfRange { now: i64, ts: i64, skew: u64 },

    /// Nonce too short or too long.
    #[error("bad nonce (length {len})")]
    BadNonce { len: usize },

    /// Nonce already seen within its TTL.
    #[error("replayed nonce")]
    Replay,

    /// Durable write of the approval record failed.
    #[error("persist failed: {0}")]
    PersistFailed(String),
}

impl AuthError {
    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::ServerMisconfigured => "server_token_not_configured",
            AuthError::BadToken(code) => *code,
            AuthError::IpNotAllowed(_) => "ip_not_allowed",
            AuthError::BadRemote(_) => "bad_remote",
            AuthError::TimestampOutOfRange { .. } => "timestamp_out_of_range",
            AuthError::BadNonce { .. } => "bad_nonce",
            AuthError::Replay => "replay",
            AuthError::PersistFailed(_) => "persist_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::ServerMisconfigured
            | AuthError::BadToken(_)
            | AuthError::IpNotAllowed(_)
            | AuthError::BadRemote(_) => StatusCode::UNAUTHORIZED,
            AuthError::TimestampOutOfRange { .. } | AuthError::BadNonce { .. } => {
                StatusCode::BAD_REQUEST
            }
            AuthError::Replay => StatusCode::CONFLICT,
            AuthError::PersistFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body for the HTTP response; timestamp errors include the window.
    pub fn body(&self) -> Value {
        let mut body = json!({ "ok": false, "error": self.code() });
        match self {
            AuthError::TimestampOutOfRange { now, ts, skew } => {
                body["now"] = json!(now);
                body["ts"] = json!(ts);
                body["skew"] = json!(skew);
            }
            AuthError::IpNotAllowed(ip) | AuthError::BadRemote(ip) => {
                body["ip"] = json!(ip);
            }
            AuthError::PersistFailed(detail) => {
                body["detail"] = json!(detail);
            }
            _ => {}
        }
        body
    }
}

/// Failures while reading or mutating the plan document.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("malformed plan document: {0}")]
    MalformedPlanDocument(String),

    #[error("step not found: {0:?}")]
    StepNotFound(String),

    #[error("plan has no steps")]
    NoCurrentStep,

    #[error("plan I/O failed: {0}")]
    Io(#[from] anyhow::Error),
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::MalformedPlanDocument(_) => "malformed_plan_document",
            PlanError::StepNotFound(_) => "step_not_found",
            PlanError::NoCurrentStep => "no_current_step",
            PlanError::Io(_) => "plan_io",
        }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
