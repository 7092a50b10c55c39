use super::{request_now, ApproveSlot, Gateway, Reply};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Shared = State<Arc<Gateway>>;

/// One route table for the whole surface.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/approve", post(approve))
        .route("/process", post(process))
        .route("/plan", get(plan))
        .route("/recent", get(recent))
        .route("/summary", get(summary))
        .route("/notes", get(notes))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .with_state(gateway)
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn approve(
    State(gateway): Shared,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let auth = authorization(&headers);
    // A body that is not JSON still goes through the guard and fails there.
    let body: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));
    let remote = peer.ip().to_string();
    let budget = Duration::from_millis(gateway.config().auth_timeout_ms);
    let slot = Arc::new(ApproveSlot::new(Instant::now() + budget));
    let worker_slot = Arc::clone(&slot);
    let mut task = tokio::task::spawn_blocking(move || {
        gateway.approve(auth.as_deref(), &remote, &body, request_now(), &worker_slot)
    });
    let waited = tokio::time::timeout(budget, &mut task).await;
    let joined = match waited {
        Ok(joined) => joined,
        Err(_) if slot.abandon() => {
            tracing::warn!(budget_ms = budget.as_millis() as u64, "approval auth path timed out");
            return Reply::timed_out();
        }
        // The worker committed first; its reply stands.
        Err(_) => task.await,
    };
    match joined {
        Ok(reply) => reply,
        Err(err) => Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "internal", err),
    }
}

async fn process(State(gateway): Shared, headers: HeaderMap) -> Reply {
    let auth = authorization(&headers);
    match tokio::task::spawn_blocking(move || gateway.process(auth.as_deref())).await {
        Ok(reply) => reply,
        Err(err) => Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "internal", err),
    }
}

async fn plan(State(gateway): Shared) -> Json<Value> {
    Json(gateway.plan())
}

async fn recent(State(gateway): Shared, Query(query): Query<RecentQuery>) -> Reply {
    match gateway.recent(query.limit) {
        Ok(body) => Reply::ok(body),
        Err(err) => Reply::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "recent_failed",
            format!("{err:#}"),
        ),
    }
}

async fn summary(State(gateway): Shared) -> Json<Value> {
    Json(gateway.summary())
}

async fn notes(State(gateway): Shared) -> Reply {
    match gateway.notes() {
        Ok(body) => Reply::ok(body),
        Err(err) => Reply::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "notes_failed",
            format!("{err:#}"),
        ),
    }
}

async fn health(State(gateway): Shared) -> Json<Value> {
    Json(gateway.health())
}

async fn ping() -> Json<Value> {
    Json(json!({ "ok": true, "t": request_now() }))
}
