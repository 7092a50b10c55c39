//! Temp-file-then-rename writes.
//!
//! Every durable artifact (nonce map, approval records, plan document) goes
//! through here so a reader never observes a half-written file.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Replace `dest` with `bytes` atomically.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = stage(dest, bytes)?;
    tmp.persist(dest)
        .map_err(|err| anyhow!(err.error))
        .with_context(|| format!("publish {}", dest.display()))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `dest` atomically.
pub fn write_json_atomic<T: serde::Serialize>(dest: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serialize JSON")?;
    write_atomic(dest, &bytes)
}

/// Publish `bytes` under `dir/name` without overwriting an existing file.
///
/// When the name is taken, `_1`, `_2`, ... is inserted before the extension.
/// `before_publish` runs after the temp file is fully written and synced but
/// before it becomes visible; an error there leaves nothing behind.
pub fn publish_new<F>(dir: &Path, name: &str, bytes: &[u8], before_publish: F) -> Result<PathBuf>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let first = dir.join(name);
    let mut tmp = stage(&first, bytes)?;
    before_publish(tmp.path())?;
    let (stem, ext) = split_name(name);
    let mut attempt = 0usize;
    loop {
        let candidate = if attempt == 0 {
            first.clone()
        } else {
            dir.join(format!("{stem}_{attempt}{ext}"))
        };
        match tmp.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tmp = err.file;
                attempt += 1;
            }
            Err(err) => {
                return Err(anyhow!(err.error))
                    .with_context(|| format!("publish {}", candidate.display()));
            }
        }
    }
}

fn stage(dest: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("staged");
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("stage {}", dest.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("stage {}", dest.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync {}", dest.display()))?;
    Ok(tmp)
}

fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}
