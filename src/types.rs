//! Core domain types for eventstash.
//!
//! This module defines the records every other module passes around: the
//! client-submitted [`Event`], the accumulated [`BulkDocument`], and the
//! [`Snapshot`] returned by reads. The serde field names are the on-disk and
//! on-the-wire names, so existing data files stay readable.

use serde::{Deserialize, Deserializer, Serialize};

/// Default byte ceiling for a namespace's append log (`stream.jsonl`).
pub const MAX_STREAM_BYTES: u64 = 8 * 1024 * 1024; // 8 MiB

/// Default byte ceiling for a namespace's bulk document (`bulk.json`).
pub const MAX_BULK_BYTES: u64 = 8 * 1024 * 1024; // 8 MiB

/// File name of the append log inside a namespace directory.
pub const STREAM_FILE_NAME: &str = "stream.jsonl";

/// File name of the bulk document inside a namespace directory.
pub const BULK_FILE_NAME: &str = "bulk.json";

/// One client event.
///
/// Every field defaults when absent from the input JSON or given as `null`, and
/// unknown fields are ignored. `server_time` is assigned by the store when the event is accepted
/// and is left out of the serialized form while empty.
///
/// # Fields
///
/// * `seq` - Client-supplied sequence hint. Not checked for uniqueness.
/// * `kind` - Event kind tag (`"type"` on the wire).
/// * `message` - Free-text message.
/// * `client_time` - Timestamp reported by the client, stored verbatim.
/// * `user` - Raw user identifier the client sent.
/// * `server_time` - RFC3339 UTC timestamp with nanoseconds, set at accept time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// Client-supplied sequence hint.
    #[serde(deserialize_with = "nullable")]
    pub seq: i64,
    /// Event kind tag.
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
    /// Free-text message.
    #[serde(deserialize_with = "nullable")]
    pub message: String,
    /// Client-reported timestamp.
    #[serde(rename = "clientTime", deserialize_with = "nullable")]
    pub client_time: String,
    /// Raw user identifier.
    #[serde(deserialize_with = "nullable")]
    pub user: String,
    /// Server-assigned accept timestamp. Empty until the event is stored.
    #[serde(
        rename = "serverTime",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "nullable"
    )]
    pub server_time: String,
}

/// The accumulated bulk batches of one namespace.
///
/// Each merge appends its batch to `events` and replaces `saved_at`.
/// A `null` event list in stored JSON reads back as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkDocument {
    /// Events from every successful merge, oldest batch first.
    #[serde(deserialize_with = "nullable")]
    pub events: Vec<Event>,
    /// Accept timestamp of the last successful merge. Empty if never merged.
    #[serde(rename = "savedAt", deserialize_with = "nullable")]
    pub saved_at: String,
}

impl BulkDocument {
    /// Returns `true` if the document holds no events and was never saved.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.saved_at.is_empty()
    }
}

/// Everything currently visible for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Parsable lines of the append log, in file order.
    #[serde(deserialize_with = "nullable")]
    pub stream: Vec<Event>,
    /// The bulk document, or an empty one if missing or unreadable.
    #[serde(deserialize_with = "nullable")]
    pub bulk: BulkDocument,
}

/// Deserialize a value that may also be `null`, which reads as the default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
