//! Read-only access to namespace files.
//!
//! `ReadHandle` rebuilds a namespace's [`Snapshot`] straight from disk without
//! going through the writer task. Reads never fail: missing files, unreadable
//! files and unparsable records all degrade to empty data.

use crate::bulk;
use crate::layout::Layout;
use crate::namespace::Namespace;
use crate::stream;
use crate::types::Snapshot;

/// Read the current snapshot of `ns` under `layout`.
pub fn read_snapshot(layout: &Layout, ns: &Namespace) -> Snapshot {
    Snapshot {
        stream: stream::read_events(&layout.stream_path(ns)),
        bulk: bulk::load(&layout.bulk_path(ns)),
    }
}

/// Cloneable, read-only handle onto the data root.
///
/// This is the handle HTTP read handlers hold. Mutations go through
/// [`crate::WriterHandle`]; since trims and bulk saves replace files by
/// rename, a read racing a write sees either the old or the new file.
#[derive(Clone, Debug)]
pub struct ReadHandle {
    layout: Layout,
}

impl ReadHandle {
    /// Create a handle reading from `layout`.
    pub fn new(layout: Layout) -> ReadHandle {
        ReadHandle { layout }
    }

    /// Read the current snapshot of `ns`.
    pub fn read(&self, ns: &Namespace) -> Snapshot {
        read_snapshot(&self.layout, ns)
    }

    /// The layout this handle reads from.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::codec;
    use crate::types::{BulkDocument, Event};

    fn event(seq: i64) -> Event {
        Event {
            seq,
            kind: "k".to_string(),
            user: "bob".to_string(),
            server_time: "2024-05-01T12:00:00Z".to_string(),
            ..Event::default()
        }
    }

    #[test]
    fn unknown_namespace_reads_empty() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let handle = ReadHandle::new(Layout::new(dir.path()));

        let snapshot = handle.read(&Namespace::new("nobody"));

        assert!(snapshot.stream.is_empty());
        assert_eq!(snapshot.bulk, BulkDocument::default());
    }

    #[test]
    fn reads_both_files() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let layout = Layout::new(dir.path());
        let ns = Namespace::new("bob");
        fs::create_dir_all(layout.namespace_dir(&ns)).expect("mkdir");

        let mut lines = codec::encode_line(&event(1)).expect("encode");
        lines.extend(codec::encode_line(&event(2)).expect("encode"));
        fs::write(layout.stream_path(&ns), lines).expect("write stream");

        let doc = BulkDocument {
            events: vec![event(10)],
            saved_at: "S".to_string(),
        };
        fs::write(
            layout.bulk_path(&ns),
            codec::encode_document(&doc).expect("encode"),
        )
        .expect("write bulk");

        let snapshot = ReadHandle::new(layout).read(&ns);

        assert_eq!(snapshot.stream, vec![event(1), event(2)]);
        assert_eq!(snapshot.bulk, doc);
    }

    #[test]
    fn corrupt_files_degrade_to_empty() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let layout = Layout::new(dir.path());
        let ns = Namespace::new("bob");
        fs::create_dir_all(layout.namespace_dir(&ns)).expect("mkdir");
        fs::write(layout.stream_path(&ns), b"garbage\n{\"seq\":\n").expect("write");
        fs::write(layout.bulk_path(&ns), b"{not json").expect("write");

        let snapshot = read_snapshot(&layout, &ns);

        assert!(snapshot.stream.is_empty());
        assert!(snapshot.bulk.is_empty());
    }

    #[test]
    fn namespaces_are_isolated() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let layout = Layout::new(dir.path());
        let bob = Namespace::new("bob");
        fs::create_dir_all(layout.namespace_dir(&bob)).expect("mkdir");
        fs::write(
            layout.stream_path(&bob),
            codec::encode_line(&event(1)).expect("encode"),
        )
        .expect("write");

        assert_eq!(read_snapshot(&layout, &bob).stream.len(), 1);
        assert!(read_snapshot(&layout, &Namespace::new("alice")).stream.is_empty());
    }
}
