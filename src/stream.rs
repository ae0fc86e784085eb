//! The append log: one event per line, capped by size.
//!
//! Each append adds a line at the end of the file and then enforces the byte
//! ceiling by keeping only the trailing `max_bytes` of the file. The cut is
//! byte-based, so the first surviving line may be a fragment; readers skip it.
//!
//! Trimming is maintenance. Once the line is written the append has succeeded,
//! and a failing trim only shows up as [`TrimOutcome::Failed`].

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::codec;
use crate::error::Error;
use crate::layout::replace_file;
use crate::types::Event;

/// What the size check after an append did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimOutcome {
    /// The file was within the ceiling; nothing changed.
    Untouched,
    /// The head of the file was discarded.
    Trimmed {
        /// Number of bytes dropped from the front of the file.
        discarded_bytes: u64,
    },
    /// The check or the rewrite failed. The appended line is still on disk.
    Failed {
        /// Description of the underlying I/O error.
        reason: String,
    },
}

/// Append `line` to the log at `path`, creating the file and its directory as
/// needed, then enforce `max_bytes`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be created or the file cannot
/// be opened or written. Trim failures are not errors.
pub fn append_line(path: &Path, line: &[u8], max_bytes: u64) -> Result<TrimOutcome, Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line)?;
    drop(file);

    Ok(enforce_ceiling(path, max_bytes))
}

/// Keep only the trailing `max_bytes` of the file at `path`.
///
/// Reads the whole file; this costs O(file size) on every call once the log
/// is at the ceiling.
pub fn enforce_ceiling(path: &Path, max_bytes: u64) -> TrimOutcome {
    match trim(path, max_bytes) {
        Ok(0) => TrimOutcome::Untouched,
        Ok(discarded_bytes) => {
            tracing::debug!(
                path = %path.display(),
                discarded_bytes,
                "trimmed append log head"
            );
            TrimOutcome::Trimmed { discarded_bytes }
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "append log trim failed");
            TrimOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Returns the number of bytes dropped from the head.
fn trim(path: &Path, max_bytes: u64) -> std::io::Result<u64> {
    let raw = fs::read(path)?;
    let len = raw.len() as u64;
    if len <= max_bytes {
        return Ok(0);
    }
    let cut = len - max_bytes;
    replace_file(path, &raw[cut as usize..])?;
    Ok(cut)
}

/// Read every parsable event of the log at `path`, in file order.
///
/// A missing or unreadable file reads as empty.
pub fn read_events(path: &Path) -> Vec<Event> {
    match fs::read(path) {
        Ok(raw) => codec::decode_lines(&raw),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "append log unreadable");
            }
            Vec::new()
        }
    }
}
