//! Single-writer task for eventstash.
//!
//! Every mutation (append, merge, reset) is sent as a [`WriteRequest`] over a
//! bounded `tokio::mpsc` channel to one task that owns the [`Store`]. The task
//! handles requests one at a time in arrival order, so an append and its trim,
//! or a merge's load and save, never interleave with another write. Reads do
//! not go through here; they use [`ReadHandle`].

use metrics::counter;
use tokio::sync::{mpsc, oneshot};

use crate::bulk::Merged;
use crate::error::Error;
use crate::namespace::Namespace;
use crate::reader::ReadHandle;
use crate::store::{Appended, ResetOutcome, Store};
use crate::stream::TrimOutcome;
use crate::types::Event;

/// A mutation sent to the writer task, with the channel its result goes back on.
pub enum WriteRequest {
    /// Append one event to a namespace's log.
    Append {
        namespace: Namespace,
        event: Event,
        response_tx: oneshot::Sender<Result<Appended, Error>>,
    },
    /// Merge a batch into a namespace's bulk document.
    Merge {
        namespace: Namespace,
        events: Vec<Event>,
        response_tx: oneshot::Sender<Result<Merged, Error>>,
    },
    /// Delete a namespace's files.
    Reset {
        namespace: Namespace,
        response_tx: oneshot::Sender<ResetOutcome>,
    },
}

impl WriteRequest {
    fn namespace(&self) -> &Namespace {
        match self {
            WriteRequest::Append { namespace, .. }
            | WriteRequest::Merge { namespace, .. }
            | WriteRequest::Reset { namespace, .. } => namespace,
        }
    }
}

/// Cloneable handle for submitting mutations to the writer task.
///
/// Cloning produces another sender into the same channel, so any number of
/// request handlers can submit work concurrently.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteRequest>,
}

fn writer_closed() -> Error {
    Error::InvalidArgument("writer task closed".into())
}

impl WriterHandle {
    /// Create a new `WriterHandle` from the sender half of an mpsc channel.
    pub fn new(tx: mpsc::Sender<WriteRequest>) -> Self {
        Self { tx }
    }

    async fn submit<T>(
        &self,
        request: WriteRequest,
        response_rx: oneshot::Receiver<T>,
    ) -> Result<T, Error> {
        self.tx.send(request).await.map_err(|_| writer_closed())?;
        // A dropped sender means the writer task stopped before answering.
        response_rx.await.map_err(|_| writer_closed())
    }

    /// Append `event` to the log of `namespace`.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or `Error::InvalidArgument("writer task closed")`
    /// if the writer task is gone.
    pub async fn append(&self, namespace: Namespace, event: Event) -> Result<Appended, Error> {
        let (response_tx, response_rx) = oneshot::channel();
        let request = WriteRequest::Append {
            namespace,
            event,
            response_tx,
        };
        self.submit(request, response_rx).await?
    }

    /// Merge `events` into the bulk document of `namespace`.
    ///
    /// # Errors
    ///
    /// Returns the store's error (`EmptyBatch`, `StorageLimit`, `Io`), or
    /// `Error::InvalidArgument("writer task closed")` if the writer task is gone.
    pub async fn merge(&self, namespace: Namespace, events: Vec<Event>) -> Result<Merged, Error> {
        let (response_tx, response_rx) = oneshot::channel();
        let request = WriteRequest::Merge {
            namespace,
            events,
            response_tx,
        };
        self.submit(request, response_rx).await?
    }

    /// Delete the files of `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument("writer task closed")` if the writer task
    /// is gone. Removal problems are not errors.
    pub async fn reset(&self, namespace: Namespace) -> Result<ResetOutcome, Error> {
        let (response_tx, response_rx) = oneshot::channel();
        let request = WriteRequest::Reset {
            namespace,
            response_tx,
        };
        self.submit(request, response_rx).await
    }
}

/// Record the metrics for one append result.
fn observe_append(result: &Result<Appended, Error>) {
    match result {
        Ok(appended) => {
            counter!("eventstash_appends_total").increment(1);
            match appended.trim {
                TrimOutcome::Untouched => {}
                TrimOutcome::Trimmed { .. } => {
                    counter!("eventstash_stream_trims_total").increment(1);
                }
                TrimOutcome::Failed { .. } => {
                    counter!("eventstash_trim_failures_total").increment(1);
                }
            }
        }
        Err(_) => {
            counter!("eventstash_write_errors_total", "op" => "append").increment(1);
        }
    }
}

/// Record the metrics for one merge result.
fn observe_merge(result: &Result<Merged, Error>) {
    match result {
        Ok(_) => counter!("eventstash_merges_total").increment(1),
        Err(Error::StorageLimit { .. }) => {
            counter!("eventstash_merge_rejections_total").increment(1);
        }
        Err(Error::EmptyBatch) => {}
        Err(_) => counter!("eventstash_write_errors_total", "op" => "merge").increment(1),
    }
}

/// Run the writer task loop.
///
/// Receives requests from the channel and applies each to `store` in order,
/// sending the result back on the request's oneshot. The loop exits when every
/// `WriterHandle` has been dropped.
///
/// If a caller stopped waiting before its result was sent, a `tracing::warn!`
/// is logged and the result is discarded. The write itself is not undone.
pub(crate) async fn run_writer(mut store: Store, mut rx: mpsc::Receiver<WriteRequest>) {
    while let Some(request) = rx.recv().await {
        let namespace = request.namespace().clone();
        let delivered = match request {
            WriteRequest::Append {
                namespace,
                event,
                response_tx,
            } => {
                let result = store.append(&namespace, event);
                if let Err(ref e) = result {
                    tracing::error!(namespace = %namespace, error = %e, "append failed");
                }
                observe_append(&result);
                response_tx.send(result).is_ok()
            }
            WriteRequest::Merge {
                namespace,
                events,
                response_tx,
            } => {
                let result = store.merge(&namespace, events);
                match result {
                    Err(Error::StorageLimit { size, max }) => {
                        tracing::info!(namespace = %namespace, size, max, "bulk merge rejected");
                    }
                    Err(Error::EmptyBatch) => {}
                    Err(ref e) => {
                        tracing::error!(namespace = %namespace, error = %e, "bulk merge failed");
                    }
                    Ok(_) => {}
                }
                observe_merge(&result);
                response_tx.send(result).is_ok()
            }
            WriteRequest::Reset {
                namespace,
                response_tx,
            } => {
                let outcome = store.reset(&namespace);
                counter!("eventstash_resets_total").increment(1);
                response_tx.send(outcome).is_ok()
            }
        };

        if !delivered {
            tracing::warn!("writer: response receiver dropped for namespace {namespace}");
        }
    }
    // Channel closed -- all WriterHandle senders have been dropped.
    tracing::debug!("writer task exiting");
}

/// Spawn the writer task on the tokio runtime.
///
/// Takes a [`ReadHandle`] onto the store's data root before moving the store
/// into the task.
///
/// # Arguments
///
/// * `store` - The storage engine to move into the writer task.
/// * `channel_capacity` - Bound on the mpsc channel. Controls backpressure.
///
/// # Returns
///
/// A tuple of:
/// - `WriterHandle` -- cloneable sender for submitting mutations.
/// - `ReadHandle` -- read-only view of the same data root.
/// - `JoinHandle<()>` -- handle to await graceful shutdown of the writer task.
pub fn spawn_writer(
    store: Store,
    channel_capacity: usize,
) -> (WriterHandle, ReadHandle, tokio::task::JoinHandle<()>) {
    let read_handle = store.read_handle();

    let (tx, rx) = mpsc::channel(channel_capacity);
    let writer_handle = WriterHandle::new(tx);

    let join_handle = tokio::spawn(run_writer(store, rx));

    (writer_handle, read_handle, join_handle)
}
