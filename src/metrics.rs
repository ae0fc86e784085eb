//! Prometheus metrics infrastructure for eventstash.
//!
//! Installs a global metrics recorder and serves the rendered output over HTTP
//! on its own listener, separate from the API.
//!
//! # Metrics
//!
//! | Name                                 | Kind    | Recorded by |
//! |--------------------------------------|---------|-------------|
//! | `eventstash_appends_total`           | counter | writer task |
//! | `eventstash_stream_trims_total`      | counter | writer task |
//! | `eventstash_trim_failures_total`     | counter | writer task |
//! | `eventstash_merges_total`            | counter | writer task |
//! | `eventstash_merge_rejections_total`  | counter | writer task |
//! | `eventstash_write_errors_total{op}`  | counter | writer task |
//! | `eventstash_resets_total`            | counter | writer task |
//! | `eventstash_reads_total`             | counter | `GET /list` |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;

/// Error type for metrics installation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The global metrics recorder has already been installed.
    #[error("metrics recorder already installed")]
    AlreadyInstalled,

    /// The exporter could not build or register its recorder.
    #[error("failed to install metrics recorder: {0}")]
    Build(String),
}

/// Handle to the installed Prometheus metrics recorder.
///
/// Cheap to clone. Renders the current snapshot in Prometheus exposition format.
#[derive(Clone, Debug)]
pub struct MetricsHandle {
    inner: Arc<PrometheusHandle>,
}

impl MetricsHandle {
    /// Render the current metrics snapshot in Prometheus exposition format.
    pub fn render(&self) -> String {
        self.inner.render()
    }
}

/// Guard so the global recorder is installed at most once per process.
static RECORDER_HANDLE: std::sync::OnceLock<MetricsHandle> = std::sync::OnceLock::new();

/// Install the global Prometheus metrics recorder.
///
/// Call once at startup, before any `metrics` macro fires. Until then, the
/// macros are no-ops.
///
/// # Errors
///
/// Returns [`MetricsError::AlreadyInstalled`] if the recorder has already been
/// installed, or [`MetricsError::Build`] if the exporter refuses to install.
pub fn install_recorder() -> Result<MetricsHandle, MetricsError> {
    if RECORDER_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInstalled);
    }

    let mut installed = None;
    let handle = RECORDER_HANDLE.get_or_init(|| {
        match PrometheusBuilder::new().install_recorder() {
            Ok(prom_handle) => {
                installed = Some(Ok(()));
                MetricsHandle {
                    inner: Arc::new(prom_handle),
                }
            }
            Err(e) => {
                // Another recorder owns the global slot; keep a detached
                // handle so rendering still works.
                installed = Some(Err(e.to_string()));
                MetricsHandle {
                    inner: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
                }
            }
        }
    });

    match installed {
        Some(Ok(())) => Ok(handle.clone()),
        Some(Err(reason)) => Err(MetricsError::Build(reason)),
        None => Err(MetricsError::AlreadyInstalled),
    }
}

/// Returns the previously installed [`MetricsHandle`], if any.
///
/// Useful in tests, where another test in the same process may already have
/// called [`install_recorder`].
pub fn get_installed_handle() -> Option<MetricsHandle> {
    RECORDER_HANDLE.get().cloned()
}

/// Build the axum [`Router`] that serves Prometheus metrics at `GET /metrics`.
fn metrics_router(handle: MetricsHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move {
                let body = h.render();
                (
                    [(
                        axum::http::header::CONTENT_TYPE,
                        "text/plain; version=0.0.4",
                    )],
                    body,
                )
            }
        }),
    )
}

/// Spawn an axum HTTP server that serves Prometheus metrics at `GET /metrics`.
///
/// Binds `addr` inside the spawned task. On bind failure, logs
/// `tracing::error!` and the returned `JoinHandle` resolves immediately.
pub fn serve_metrics(handle: MetricsHandle, addr: SocketAddr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "Failed to bind metrics listener");
                return;
            }
        };
        run_metrics_server(handle, listener).await;
    })
}

/// Spawn the metrics server on an already-bound listener.
///
/// Useful in tests where the caller needs the ephemeral port up front.
pub fn serve_metrics_on_listener(
    handle: MetricsHandle,
    listener: tokio::net::TcpListener,
) -> JoinHandle<()> {
    tokio::spawn(run_metrics_server(handle, listener))
}

async fn run_metrics_server(handle: MetricsHandle, listener: tokio::net::TcpListener) {
    let app = metrics_router(handle);

    match listener.local_addr() {
        Ok(bound_addr) => tracing::info!(addr = %bound_addr, "Metrics server listening"),
        Err(e) => tracing::warn!(error = %e, "Metrics listener has no local address"),
    }

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Metrics server error");
    }
}
