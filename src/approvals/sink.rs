use super::ApprovalRecord;
use crate::atomic::publish_new;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Durable, exactly-once-on-disk storage for accepted approvals.
///
/// The sink does not interpret actions; whatever the guard accepted is stored.
#[derive(Debug, Clone)]
pub struct ApprovalSink {
    dir: PathBuf,
}

impl ApprovalSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Write `record` under its chronological name; returns the published path.
    pub fn persist(&self, record: &ApprovalRecord) -> Result<PathBuf> {
        self.persist_with(record, |_| Ok(()))
    }

    pub(crate) fn persist_with<F>(
        &self,
        record: &ApprovalRecord,
        before_publish: F,
    ) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let bytes = serde_json::to_vec_pretty(record).context("serialize approval record")?;
        let path = publish_new(&self.dir, &record.file_name(), &bytes, before_publish)
            .with_context(|| format!("persist approval into {}", self.dir.display()))?;
        tracing::info!(
            action = %record.action,
            nonce = %record.nonce,
            remote = %record.remote,
            path = %path.display(),
            "approval persisted"
        );
        Ok(path)
    }
}
