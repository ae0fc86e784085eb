//! eventstash: a small per-user flat-file event log service.
//!
//! Each user namespace is a directory under the data root holding an
//! append-only `stream.jsonl` with a trailing-bytes ceiling and a merged
//! `bulk.json` document. All mutations are serialized through one writer task.

pub mod bulk;
pub mod clock;
pub mod codec;
pub mod error;
pub mod layout;
pub mod metrics;
pub mod namespace;
pub mod reader;
pub mod service;
pub mod store;
pub mod stream;
pub mod types;
pub mod writer;

pub use bulk::Merged;
pub use clock::{Clock, MockClock, SystemClock, format_timestamp};
pub use error::Error;
pub use layout::Layout;
pub use namespace::{FALLBACK_NAMESPACE, Namespace, sanitize};
pub use reader::ReadHandle;
pub use service::{AppState, router};
pub use store::{Appended, Removal, ResetOutcome, Store, StoreOptions};
pub use stream::TrimOutcome;
pub use types::{BulkDocument, Event, MAX_BULK_BYTES, MAX_STREAM_BYTES, Snapshot};
pub use writer::{WriterHandle, spawn_writer};

#[cfg(test)]
mod tests {
    #[test]
    fn reexport_event() {
        let event = crate::Event {
            seq: 3,
            kind: "click".to_string(),
            ..crate::Event::default()
        };
        assert_eq!(event.seq, 3);
        assert!(event.server_time.is_empty());
    }

    #[test]
    fn reexport_snapshot() {
        let snapshot = crate::Snapshot::default();
        assert!(snapshot.stream.is_empty());
        assert!(snapshot.bulk.is_empty());
    }

    #[test]
    fn reexport_namespace() {
        assert_eq!(crate::sanitize("a/b"), "ab");
        assert_eq!(crate::Namespace::new("").as_str(), crate::FALLBACK_NAMESPACE);
    }

    #[test]
    fn reexport_ceilings() {
        assert_eq!(crate::MAX_STREAM_BYTES, 8 * 1024 * 1024);
        assert_eq!(crate::MAX_BULK_BYTES, 8 * 1024 * 1024);
    }

    #[test]
    fn reexport_error() {
        let err = crate::Error::InvalidArgument("test".into());
        assert!(err.to_string().contains("test"));
    }
}
