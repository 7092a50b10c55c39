//! Typed paths into the gateway's on-disk layout.
//!
//! Centralizing path construction keeps every directory scan and rename
//! pointed at the same places the sink and dispatcher agree on.
use crate::config::GatewayConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// File name prefix shared by every approval record.
pub const APPROVAL_PREFIX: &str = "approve_";
/// File name suffix shared by every approval record.
pub const APPROVAL_SUFFIX: &str = ".json";

/// Resolved locations for approvals, archives, state, notes, and the plan.
#[derive(Debug, Clone)]
pub struct GatewayPaths {
    root: PathBuf,
    approvals_dir: PathBuf,
    processed_dir: PathBuf,
    state_dir: PathBuf,
    notes_path: PathBuf,
    plan_path: PathBuf,
}

impl GatewayPaths {
    /// Resolve config paths against `root`; absolute paths are kept as-is.
    pub fn new(root: PathBuf, config: &GatewayConfig) -> Self {
        Self {
            approvals_dir: root.join(&config.approvals_dir),
            processed_dir: root.join(&config.processed_dir),
            state_dir: root.join(&config.state_dir),
            notes_path: root.join(&config.notes_path),
            plan_path: root.join(&config.plan_path),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding unprocessed approval records.
    pub fn approvals_dir(&self) -> &Path {
        &self.approvals_dir
    }

    /// Archive directory processed records are moved into.
    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Single JSON map of nonce to first-seen epoch.
    pub fn nonces_path(&self) -> PathBuf {
        self.state_dir.join("nonces.json")
    }

    /// Append-only notes log written by `ASK` approvals.
    pub fn notes_path(&self) -> &Path {
        &self.notes_path
    }

    pub fn plan_path(&self) -> &Path {
        &self.plan_path
    }

    /// Create the approvals, processed, and state directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.approvals_dir, &self.processed_dir, &self.state_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// True when `name` looks like a published approval record.
pub fn is_approval_file_name(name: &str) -> bool {
    name.starts_with(APPROVAL_PREFIX) && name.ends_with(APPROVAL_SUFFIX)
}

/// List approval record names in `dir`, sorted ascending (oldest first).
///
/// A missing directory is an empty listing.
pub fn list_approval_names(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read {}", dir.display()))?;
        if !entry.file_type().map(|kind| kind.is_file()).unwrap_or(false) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_approval_file_name(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
