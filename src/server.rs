//! HTTP surface.
//!
//! [`Gateway`] holds the request logic as plain blocking methods so it can be
//! exercised without a socket; [`handlers`] adapts it to axum and [`poller`]
//! runs the dispatcher on a timer.
//!
//! # Submodules
//!
//! - [`handlers`]: axum routes and extractors
//! - [`poller`]: interval-driven dispatch
mod handlers;
mod poller;

use crate::approvals::{
    ApprovalDispatcher, ApprovalRecord, ApprovalRequest, ApprovalSink, NotesLog,
};
use crate::auth::{parse_timestamp, AuthGuard};
use crate::config::GatewayConfig;
use crate::paths::{list_approval_names, GatewayPaths};
use crate::plan::{plan_view, PlanDocument, PlanSummary};
use crate::util::{now_epoch_secs, tail_string};
use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use handlers::router;

const NOTES_TAIL_BYTES: usize = 500;

/// Status code plus JSON body, independent of any HTTP framework.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn error(status: StatusCode, code: &str, detail: impl std::fmt::Display) -> Self {
        Self {
            status,
            body: json!({ "ok": false, "error": code, "detail": detail.to_string() }),
        }
    }

    /// `503 auth_timeout`: nothing was persisted.
    pub fn timed_out() -> Self {
        Self::error(
            StatusCode::SERVICE_UNAVAILABLE,
            "auth_timeout",
            "approval abandoned before it was persisted",
        )
    }
}

const SLOT_OPEN: u8 = 0;
const SLOT_COMMITTED: u8 = 1;
const SLOT_ABANDONED: u8 = 2;

/// Hand-off between an `/approve` handler and the blocking worker serving it.
///
/// The worker persists only after [`ApproveSlot::commit`] succeeds and the
/// handler answers `auth_timeout` only after [`ApproveSlot::abandon`]
/// succeeds; exactly one of the two can win.
#[derive(Debug)]
pub struct ApproveSlot {
    state: AtomicU8,
    deadline: Instant,
}

impl ApproveSlot {
    pub fn new(deadline: Instant) -> Self {
        Self {
            state: AtomicU8::new(SLOT_OPEN),
            deadline,
        }
    }

    /// Worker side: claim the right to persist. Fails once the deadline has
    /// passed or the handler has given up.
    pub fn commit(&self) -> bool {
        if Instant::now() >= self.deadline {
            self.abandon();
        }
        self.state
            .compare_exchange(SLOT_OPEN, SLOT_COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Handler side: give up on the request. Fails when the worker has
    /// already committed, in which case its reply must be awaited.
    pub fn abandon(&self) -> bool {
        match self.state.compare_exchange(
            SLOT_OPEN,
            SLOT_ABANDONED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(state) => state == SLOT_ABANDONED,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Shared state behind every route.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    paths: GatewayPaths,
    guard: AuthGuard,
    sink: ApprovalSink,
    dispatcher: ApprovalDispatcher,
    notes: NotesLog,
}

impl Gateway {
    pub fn new(config: GatewayConfig, paths: GatewayPaths) -> Result<Self> {
        let guard = AuthGuard::from_config(&config, &paths)?;
        Ok(Self {
            sink: ApprovalSink::new(paths.approvals_dir().to_path_buf()),
            dispatcher: ApprovalDispatcher::new(&paths),
            notes: NotesLog::new(paths.notes_path().to_path_buf()),
            guard,
            config,
            paths,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn paths(&self) -> &GatewayPaths {
        &self.paths
    }

    pub fn dispatcher(&self) -> &ApprovalDispatcher {
        &self.dispatcher
    }

    /// `POST /approve`: authorize, then persist the record.
    ///
    /// Nothing is persisted unless `slot` is committed; a request whose
    /// deadline has already passed does not consume its nonce either.
    pub fn approve(
        &self,
        authorization: Option<&str>,
        remote: &str,
        body: &Value,
        now: i64,
        slot: &ApproveSlot,
    ) -> Reply {
        if slot.expired() && slot.abandon() {
            return Reply::timed_out();
        }
        let request = ApprovalRequest::from_body(body);
        if let Err(err) = self.guard.authorize(
            authorization,
            remote,
            request.timestamp.as_ref(),
            &request.nonce,
            now,
        ) {
            tracing::warn!(remote = %remote, code = err.code(), "approval rejected");
            return Reply {
                status: err.status(),
                body: err.body(),
            };
        }
        let timestamp = request
            .timestamp
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(now);
        let nonce = request.nonce.clone();
        let record = ApprovalRecord::new(request, timestamp, remote, now);
        if !slot.commit() {
            tracing::warn!(remote = %remote, %nonce, "approval abandoned before persisting");
            return Reply::timed_out();
        }
        match self.sink.persist(&record) {
            Ok(path) => Reply::ok(json!({
                "ok": true,
                "nonce": nonce,
                "file": path.file_name().map(|name| name.to_string_lossy().into_owned()),
            })),
            Err(err) => {
                let err = crate::error::AuthError::PersistFailed(format!("{err:#}"));
                tracing::warn!(error = %err, "approval could not be persisted");
                Reply {
                    status: err.status(),
                    body: err.body(),
                }
            }
        }
    }

    /// `POST /process`: bearer-only trigger for one dispatcher cycle.
    pub fn process(&self, authorization: Option<&str>) -> Reply {
        if let Err(err) = self.guard.check_bearer(authorization) {
            return Reply {
                status: err.status(),
                body: err.body(),
            };
        }
        match self.dispatcher.process_pending() {
            Ok(results) => Reply::ok(json!({ "ok": true, "processed": results })),
            Err(err) => Reply::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "process_failed",
                format!("{err:#}"),
            ),
        }
    }

    /// `GET /plan`; never fails.
    pub fn plan(&self) -> Value {
        plan_view(self.paths.plan_path())
    }

    /// `GET /recent`: newest approval names, pending and processed.
    pub fn recent(&self, limit: Option<usize>) -> Result<Value> {
        let limit = limit.unwrap_or(self.config.recent_limit);
        let notes = self.notes.read()?;
        Ok(json!({
            "ok": true,
            "pending": newest_first(list_approval_names(self.paths.approvals_dir())?, limit),
            "processed": newest_first(list_approval_names(self.paths.processed_dir())?, limit),
            "notes_len": notes.len(),
            "notes_tail": tail_string(&notes, NOTES_TAIL_BYTES),
        }))
    }

    /// `GET /summary`.
    pub fn summary(&self) -> Value {
        let latest = self.latest_approval();
        let summary = match PlanDocument::load(self.paths.plan_path()) {
            Ok(doc) => PlanSummary::build(doc.root(), latest),
            Err(err) => {
                tracing::warn!(error = %err, "plan unavailable for summary");
                PlanSummary {
                    latest_approval: latest,
                    ..PlanSummary::default()
                }
            }
        };
        json!({ "ok": true, "summary": summary })
    }

    /// `GET /health`.
    pub fn health(&self) -> Value {
        json!({
            "ok": true,
            "has_token": self.guard.has_token(),
            "approvals_dir_exists": self.paths.approvals_dir().is_dir(),
            "processed_dir_exists": self.paths.processed_dir().is_dir(),
            "state_dir_exists": self.paths.state_dir().is_dir(),
            "plan_exists": self.paths.plan_path().is_file(),
        })
    }

    /// `GET /notes`.
    pub fn notes(&self) -> Result<Value> {
        let text = self.notes.read()?;
        Ok(json!({ "ok": true, "len": text.len(), "text": text }))
    }

    fn latest_approval(&self) -> Option<String> {
        [self.paths.approvals_dir(), self.paths.processed_dir()]
            .iter()
            .filter_map(|dir| list_approval_names(dir).ok())
            .flatten()
            .max()
    }
}

fn newest_first(mut names: Vec<String>, limit: usize) -> Vec<String> {
    names.reverse();
    names.truncate(limit);
    names
}

/// Bind, serve until ctrl-c, and run the poller alongside.
pub async fn serve(gateway: Arc<Gateway>, bind: SocketAddr) -> Result<()> {
    gateway.paths().ensure_dirs()?;
    gateway.guard.purge_nonces(request_now())?;
    if !gateway.guard.has_token() {
        tracing::warn!(
            "no approval token configured; /approve and /process will reject every request"
        );
    }
    let poll = gateway.config().poll_interval_seconds;
    let poller =
        (poll > 0).then(|| poller::spawn(Arc::clone(&gateway), Duration::from_secs(poll)));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    let local = listener.local_addr().context("read bound address")?;
    tracing::info!(
        addr = %local,
        root = %gateway.paths().root().display(),
        "approval gateway listening"
    );

    let app = router(gateway);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    if let Some(poller) = poller {
        poller.abort();
    }
    tracing::info!("approval gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler unavailable; serving until killed");
        std::future::pending::<()>().await;
    }
}

/// Server clock for request handling.
pub(crate) fn request_now() -> i64 {
    now_epoch_secs().unwrap_or_default()
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
