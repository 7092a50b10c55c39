use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Append-only markdown log of operator questions.
#[derive(Debug, Clone)]
pub struct NotesLog {
    path: PathBuf,
}

impl NotesLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an `ASK` entry stamped with `at`.
    pub fn append_ask(&self, text: &str, at: DateTime<Utc>) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("ASK requires non-empty text"));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let entry = format!(
            "### ASK {}\n\n{}\n\n",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            text
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(entry.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }

    /// Full log text; a missing log reads as empty.
    pub fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err).with_context(|| format!("read {}", self.path.display())),
        }
    }
}
