use crate::atomic::write_json_atomic;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Recently seen nonces, persisted as one JSON object of `nonce -> first-seen epoch`.
///
/// Every check-and-commit holds the store lock across read, purge, lookup and
/// write, so two requests racing on the same nonce cannot both be accepted.
#[derive(Debug)]
pub struct NonceStore {
    path: PathBuf,
    ttl_seconds: u64,
    lock: Mutex<()>,
}

impl NonceStore {
    pub fn new(path: PathBuf, ttl_seconds: u64) -> Self {
        Self {
            path,
            ttl_seconds,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept `nonce` if it has not been seen within the TTL, recording it.
    ///
    /// Returns `Ok(false)` for a replay. Errors only when the store cannot be
    /// written.
    pub fn check_and_commit(&self, nonce: &str, now: i64) -> Result<bool> {
        let _guard = self.acquire();
        let mut entries = self.load();
        let purged = self.purge_entries(&mut entries, now);
        if entries.contains_key(nonce) {
            if purged > 0 {
                self.store(&entries)?;
            }
            return Ok(false);
        }
        entries.insert(nonce.to_string(), now);
        self.store(&entries)?;
        Ok(true)
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge(&self, now: i64) -> Result<usize> {
        let _guard = self.acquire();
        let mut entries = self.load();
        let purged = self.purge_entries(&mut entries, now);
        if purged > 0 {
            self.store(&entries)?;
        }
        Ok(purged)
    }

    /// Number of entries currently on disk (expired ones included until purged).
    #[cfg(test)]
    pub fn len(&self) -> usize {
        let _guard = self.acquire();
        self.load().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        // The guarded state lives on disk, so a poisoned lock carries nothing stale.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn purge_entries(&self, entries: &mut BTreeMap<String, i64>, now: i64) -> usize {
        let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        let before = entries.len();
        entries.retain(|_, seen| now.saturating_sub(*seen) <= ttl);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, path = %self.path.display(), "purged expired nonces");
        }
        purged
    }

    fn load(&self) -> BTreeMap<String, i64> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "nonce store unreadable; treating as empty"
                );
                return BTreeMap::new();
            }
        };
        if text.trim().is_empty() {
            return BTreeMap::new();
        }
        let parsed: BTreeMap<String, Value> = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "nonce store corrupt; treating as empty"
                );
                return BTreeMap::new();
            }
        };
        parsed
            .into_iter()
            .filter_map(|(nonce, seen)| {
                let seen = seen.as_i64().or_else(|| seen.as_f64().map(|f| f as i64))?;
                Some((nonce, seen))
            })
            .collect()
    }

    fn store(&self, entries: &BTreeMap<String, i64>) -> Result<()> {
        write_json_atomic(&self.path, entries)
            .with_context(|| format!("write nonce store {}", self.path.display()))
    }
}
