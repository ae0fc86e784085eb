//! The bulk document: batches merged into one capped JSON document.
//!
//! A merge is a read-modify-write of the whole document. The new events go
//! after the existing ones, `savedAt` is replaced, and the result is written
//! back only if its encoded size stays within the ceiling. Over the ceiling the
//! merge is refused and the file is left as it was.

use std::fs;
use std::path::Path;

use crate::codec;
use crate::error::Error;
use crate::layout::replace_file;
use crate::types::{BulkDocument, Event};

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// `savedAt` of the written document.
    pub saved_at: String,
    /// Events in the document after the merge.
    pub total_events: usize,
    /// Encoded size of the written document in bytes.
    pub document_bytes: u64,
}

/// Load the document at `path`.
///
/// A missing or unparsable file loads as an empty document.
pub fn load(path: &Path) -> BulkDocument {
    match fs::read(path) {
        Ok(raw) => codec::decode_document(&raw).unwrap_or_else(|| {
            tracing::warn!(path = %path.display(), "bulk document unparsable, treating as empty");
            BulkDocument::default()
        }),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "bulk document unreadable");
            }
            BulkDocument::default()
        }
    }
}

/// Append `batch` to the document at `path` and stamp it with `saved_at`.
///
/// # Errors
///
/// - [`Error::EmptyBatch`] if `batch` is empty.
/// - [`Error::StorageLimit`] if the merged document would exceed `max_bytes`.
///   Nothing is written.
/// - [`Error::Io`] if the directory or file cannot be written.
pub fn merge(
    path: &Path,
    batch: Vec<Event>,
    saved_at: String,
    max_bytes: u64,
) -> Result<Merged, Error> {
    if batch.is_empty() {
        return Err(Error::EmptyBatch);
    }

    let mut doc = load(path);
    doc.events.extend(batch);
    doc.saved_at = saved_at;

    let encoded = codec::encode_document(&doc)?;
    let size = encoded.len() as u64;
    if size > max_bytes {
        return Err(Error::StorageLimit {
            size,
            max: max_bytes,
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    replace_file(path, &encoded)?;

    Ok(Merged {
        saved_at: doc.saved_at,
        total_events: doc.events.len(),
        document_bytes: size,
    })
}
