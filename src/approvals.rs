//! Approval ingestion and dispatch.
//!
//! Accepted requests become immutable JSON records dropped into the approvals
//! directory. The dispatcher later applies them oldest first and archives each
//! one into the processed directory, which is the only way a record leaves the
//! queue.
//!
//! # Submodules
//!
//! - [`record`]: request parsing and the on-disk record shape
//! - [`sink`]: atomic, no-clobber publishing of records
//! - [`notes`]: append-only notes log fed by `ASK`
//! - [`dispatch`]: ordered processing and archiving
mod dispatch;
mod notes;
mod record;
mod sink;

pub use dispatch::{ApprovalDispatcher, ProcessingResult};
pub use notes::NotesLog;
pub use record::{ApprovalRecord, ApprovalRequest};
pub use sink::ApprovalSink;

/// Action names the dispatcher understands. Anything else is archived as seen.
pub const ACTION_SET_ACTIVE_STEP: &str = "SET_ACTIVE_STEP";
pub const ACTION_APPROVE_NEXT: &str = "APPROVE_NEXT";
pub const ACTION_ASK: &str = "ASK";
