use super::{
    ApprovalRecord, NotesLog, ACTION_APPROVE_NEXT, ACTION_ASK, ACTION_SET_ACTIVE_STEP,
};
use crate::paths::{list_approval_names, GatewayPaths};
use crate::plan::PlanStateMachine;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Outcome of applying one approval record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    pub file: String,
    pub action: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Applies queued approvals in file-name order and archives each one.
#[derive(Debug)]
pub struct ApprovalDispatcher {
    approvals_dir: PathBuf,
    processed_dir: PathBuf,
    machine: PlanStateMachine,
    notes: NotesLog,
    cycle: Mutex<()>,
}

impl ApprovalDispatcher {
    pub fn new(paths: &GatewayPaths) -> Self {
        Self {
            approvals_dir: paths.approvals_dir().to_path_buf(),
            processed_dir: paths.processed_dir().to_path_buf(),
            machine: PlanStateMachine::new(paths.plan_path().to_path_buf()),
            notes: NotesLog::new(paths.notes_path().to_path_buf()),
            cycle: Mutex::new(()),
        }
    }

    /// Run one cycle over every pending record, oldest first.
    ///
    /// Each record is claimed by moving it into the processed dir before it
    /// is read, so a record another dispatcher already moved is skipped.
    /// Per-record failures land in the result list; only a failure to list
    /// the queue stops the cycle.
    pub fn process_pending(&self) -> Result<Vec<ProcessingResult>> {
        let _cycle = self.cycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let names = list_approval_names(&self.approvals_dir)?;
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let result = match self.claim(&name) {
                Ok(Some(claimed)) => self.process_one(&name, &claimed),
                Ok(None) => {
                    tracing::debug!(file = %name, "record claimed elsewhere; skipping");
                    continue;
                }
                Err(err) => ProcessingResult {
                    file: name.clone(),
                    action: String::new(),
                    ok: false,
                    error: Some(format!("{err:#}")),
                },
            };
            match &result.error {
                Some(error) => {
                    tracing::warn!(file = %name, action = %result.action, %error, "approval failed")
                }
                None => tracing::info!(file = %name, action = %result.action, "approval applied"),
            }
            results.push(result);
        }
        if !results.is_empty() {
            tracing::debug!(count = results.len(), "dispatch cycle complete");
        }
        Ok(results)
    }

    fn process_one(&self, name: &str, claimed: &Path) -> ProcessingResult {
        let record = match read_record(claimed) {
            Ok(record) => record,
            Err(err) => {
                return ProcessingResult {
                    file: name.to_string(),
                    action: String::new(),
                    ok: false,
                    error: Some(format!("{err:#}")),
                }
            }
        };
        let outcome = self.apply(&record);
        ProcessingResult {
            file: name.to_string(),
            action: record.action.clone(),
            ok: outcome.is_ok(),
            error: outcome.err().map(|err| format!("{err:#}")),
        }
    }

    fn apply(&self, record: &ApprovalRecord) -> Result<()> {
        match record.action.as_str() {
            ACTION_SET_ACTIVE_STEP => {
                let step_id = record
                    .data_str("step_id")
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| anyhow!("SET_ACTIVE_STEP requires step_id"))?;
                self.machine.set_active_step(&step_id)?;
            }
            ACTION_APPROVE_NEXT => {
                self.machine.advance()?;
            }
            ACTION_ASK => {
                let text = record.data_str("text").unwrap_or_default();
                self.notes.append_ask(&text, Utc::now())?;
            }
            other => {
                tracing::debug!(action = %other, "no handler for action; archiving as seen");
            }
        }
        Ok(())
    }

    /// Move `name` from the queue into the processed dir and return where it
    /// landed, or `None` when the record is already gone from the queue.
    ///
    /// An archived record is never replaced; a taken name gets `.dupN`.
    fn claim(&self, name: &str) -> Result<Option<PathBuf>> {
        fs::create_dir_all(&self.processed_dir)
            .with_context(|| format!("create {}", self.processed_dir.display()))?;
        let source = self.approvals_dir.join(name);
        let stem = name.strip_suffix(".json").unwrap_or(name);
        let mut dest = self.processed_dir.join(name);
        let mut attempt = 0usize;
        while dest.exists() {
            attempt += 1;
            dest = self.processed_dir.join(format!("{stem}.dup{attempt}.json"));
        }
        match fs::rename(&source, &dest) {
            Ok(()) => Ok(Some(dest)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("archive {} -> {}", source.display(), dest.display())),
        }
    }
}

fn read_record(path: &Path) -> Result<ApprovalRecord> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let record: ApprovalRecord =
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(record)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
