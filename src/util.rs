use anyhow::{Context, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current epoch time in whole seconds.
pub fn now_epoch_secs() -> Result<i64> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_secs();
    i64::try_from(secs).context("timestamp overflow")
}

/// Keep at most `max_bytes` from the end of `text`, respecting char boundaries.
pub fn tail_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

/// Strip one layer of matching single or double quotes after trimming.
pub fn strip_wrapping_quotes(value: &str) -> &str {
    let trimmed = value.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'"' || first == b'\'') {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}
