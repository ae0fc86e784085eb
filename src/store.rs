//! Storage engine for eventstash.
//!
//! `Store` owns the data root, the size ceilings and the clock, and exposes the
//! four operations the rest of the crate is built on: append to a namespace's
//! log, merge a batch into its bulk document, read both back, and reset it.
//!
//! `Store` takes no locks. The server runs it inside the single writer task
//! (see [`crate::writer`]), which serializes every mutation. Several processes
//! sharing one data root are not coordinated.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::bulk::{self, Merged};
use crate::clock::{self, Clock, SystemClock};
use crate::codec;
use crate::error::Error;
use crate::layout::Layout;
use crate::namespace::Namespace;
use crate::reader;
use crate::stream::{self, TrimOutcome};
use crate::types::{Event, MAX_BULK_BYTES, MAX_STREAM_BYTES, Snapshot};

/// Tunables for a [`Store`].
#[derive(Clone)]
pub struct StoreOptions {
    /// Byte ceiling of each append log.
    pub max_stream_bytes: u64,
    /// Byte ceiling of each bulk document.
    pub max_bulk_bytes: u64,
    /// Time source for server timestamps.
    pub clock: Arc<dyn Clock>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_stream_bytes: MAX_STREAM_BYTES,
            max_bulk_bytes: MAX_BULK_BYTES,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Result of a successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// The event as written, with `server_time` set.
    pub event: Event,
    /// What the size check after the write did. A failed trim does not undo
    /// the append.
    pub trim: TrimOutcome,
}

impl Appended {
    /// Server timestamp assigned to the event.
    pub fn server_time(&self) -> &str {
        &self.event.server_time
    }
}

/// What a reset did to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Removal {
    /// There was no file.
    #[default]
    Absent,
    /// The file existed and is gone.
    Removed,
    /// The file could not be removed and may still be on disk.
    Failed {
        /// Description of the underlying I/O error.
        reason: String,
    },
}

impl Removal {
    pub fn is_removed(&self) -> bool {
        matches!(self, Removal::Removed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Removal::Failed { .. })
    }
}

/// Result of a reset, per file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    pub stream: Removal,
    pub bulk: Removal,
}

/// Core storage engine over a data root directory.
pub struct Store {
    layout: Layout,
    max_stream_bytes: u64,
    max_bulk_bytes: u64,
    clock: Arc<dyn Clock>,
    /// Latest instant handed out by `stamp`.
    last_stamp: SystemTime,
}

impl Store {
    /// Open the store at `root` with default options, creating the directory
    /// if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the root directory cannot be created.
    pub fn open(root: &Path) -> Result<Store, Error> {
        Store::open_with(root, StoreOptions::default())
    }

    /// Open the store at `root` with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the root directory cannot be created.
    pub fn open_with(root: &Path, options: StoreOptions) -> Result<Store, Error> {
        fs::create_dir_all(root)?;
        Ok(Store {
            layout: Layout::new(root),
            max_stream_bytes: options.max_stream_bytes,
            max_bulk_bytes: options.max_bulk_bytes,
            clock: options.clock,
            last_stamp: SystemTime::UNIX_EPOCH,
        })
    }

    /// The file layout of this store.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// A read-only handle onto the same data root.
    pub fn read_handle(&self) -> reader::ReadHandle {
        reader::ReadHandle::new(self.layout.clone())
    }

    /// Current time, never earlier than any stamp handed out before.
    fn stamp(&mut self) -> String {
        let now = self.clock.now();
        if now > self.last_stamp {
            self.last_stamp = now;
        }
        clock::format_timestamp(self.last_stamp)
    }

    /// Stamp `event` and append it to the log of `ns`.
    ///
    /// Any `server_time` the client sent is overwritten. After the line is
    /// written the log is trimmed from the head to the stream ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the namespace directory or log file cannot be
    /// created or written. A failing trim is reported in
    /// [`Appended::trim`], not as an error.
    pub fn append(&mut self, ns: &Namespace, mut event: Event) -> Result<Appended, Error> {
        event.server_time = self.stamp();
        let line = codec::encode_line(&event)?;
        let trim = stream::append_line(&self.layout.stream_path(ns), &line, self.max_stream_bytes)?;

        tracing::debug!(namespace = %ns, server_time = %event.server_time, "appended event");
        Ok(Appended { event, trim })
    }

    /// Merge `batch` into the bulk document of `ns`.
    ///
    /// The new events go after the existing ones and `savedAt` is set to now.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyBatch`] if `batch` is empty.
    /// - [`Error::StorageLimit`] if the merged document would exceed the bulk
    ///   ceiling. The stored document is left unchanged.
    /// - [`Error::Io`] if the document cannot be written.
    pub fn merge(&mut self, ns: &Namespace, batch: Vec<Event>) -> Result<Merged, Error> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let saved_at = self.stamp();
        let merged = bulk::merge(
            &self.layout.bulk_path(ns),
            batch,
            saved_at,
            self.max_bulk_bytes,
        )?;

        tracing::debug!(
            namespace = %ns,
            total_events = merged.total_events,
            document_bytes = merged.document_bytes,
            "merged bulk batch"
        );
        Ok(merged)
    }

    /// Read the current snapshot of `ns`. Never fails.
    pub fn read(&self, ns: &Namespace) -> Snapshot {
        reader::read_snapshot(&self.layout, ns)
    }

    /// Delete both files of `ns`.
    ///
    /// Missing files are fine. Other removal errors are logged, reported as
    /// [`Removal::Failed`] for that file, and the operation still completes.
    pub fn reset(&mut self, ns: &Namespace) -> ResetOutcome {
        let outcome = ResetOutcome {
            stream: remove_if_present(&self.layout.stream_path(ns)),
            bulk: remove_if_present(&self.layout.bulk_path(ns)),
        };
        tracing::debug!(
            namespace = %ns,
            stream = ?outcome.stream,
            bulk = ?outcome.bulk,
            "reset namespace"
        );
        outcome
    }
}

fn remove_if_present(path: &Path) -> Removal {
    match fs::remove_file(path) {
        Ok(()) => Removal::Removed,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Removal::Absent,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove file on reset");
            Removal::Failed {
                reason: e.to_string(),
            }
        }
    }
}
