use std::net::SocketAddr;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;
use std::sync::Arc;

use eventstash::service::{self, AppState};
use eventstash::{Clock, Store, StoreOptions, SystemClock, spawn_writer};

/// Server configuration parsed from environment variables.
///
/// # Environment Variables
///
/// | Variable                       | Required | Default        | Description                       |
/// |--------------------------------|----------|----------------|-----------------------------------|
/// | `EVENTSTASH_DATA`              | Yes      | --             | Data root directory               |
/// | `EVENTSTASH_LISTEN`            | No       | `0.0.0.0:8091` | API socket address                |
/// | `EVENTSTASH_METRICS_LISTEN`    | No       | --             | Prometheus socket (enables it)    |
/// | `EVENTSTASH_MAX_STREAM_BYTES`  | No       | `8388608`      | Append log ceiling per namespace  |
/// | `EVENTSTASH_MAX_BULK_BYTES`    | No       | `8388608`      | Bulk document ceiling             |
/// | `EVENTSTASH_WRITER_CAPACITY`   | No       | `64`           | Writer channel bound              |
#[derive(Debug, Clone, PartialEq)]
struct Config {
    /// Root directory holding one subdirectory per namespace.
    data_path: PathBuf,
    /// Socket address the HTTP API listens on.
    listen_addr: SocketAddr,
    /// Socket address of the metrics endpoint. `None` disables it.
    metrics_addr: Option<SocketAddr>,
    max_stream_bytes: NonZeroU64,
    max_bulk_bytes: NonZeroU64,
    writer_capacity: NonZeroUsize,
}

/// Default socket address the server listens on when `EVENTSTASH_LISTEN` is not set.
const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::V4(std::net::SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 8091));

/// Default writer channel capacity when `EVENTSTASH_WRITER_CAPACITY` is not set.
const DEFAULT_WRITER_CAPACITY: usize = 64;

fn parse_addr(name: &str) -> Result<Option<SocketAddr>, String> {
    match std::env::var(name) {
        Ok(val) => val
            .parse::<SocketAddr>()
            .map(Some)
            .map_err(|e| format!("{name} is not a valid socket address: {e}")),
        Err(_) => Ok(None),
    }
}

fn parse_nonzero_u64(name: &str, default: u64) -> Result<NonZeroU64, String> {
    let raw = match std::env::var(name) {
        Ok(val) => val
            .parse::<u64>()
            .map_err(|e| format!("{name} is not a valid u64: {e}"))?,
        Err(_) => default,
    };
    NonZeroU64::new(raw).ok_or_else(|| format!("{name} must be nonzero"))
}

impl Config {
    /// Parse server configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Err(String)` if:
    /// - `EVENTSTASH_DATA` is not set
    /// - `EVENTSTASH_LISTEN` or `EVENTSTASH_METRICS_LISTEN` is set but not a valid `SocketAddr`
    /// - a byte ceiling is set but not a valid nonzero `u64`
    /// - `EVENTSTASH_WRITER_CAPACITY` is set but not a valid nonzero `usize`
    fn from_env() -> Result<Config, String> {
        let data_path = std::env::var("EVENTSTASH_DATA")
            .map(PathBuf::from)
            .map_err(|_| "EVENTSTASH_DATA environment variable is required".to_string())?;

        let listen_addr = parse_addr("EVENTSTASH_LISTEN")?.unwrap_or(DEFAULT_LISTEN_ADDR);
        let metrics_addr = parse_addr("EVENTSTASH_METRICS_LISTEN")?;

        let max_stream_bytes =
            parse_nonzero_u64("EVENTSTASH_MAX_STREAM_BYTES", eventstash::MAX_STREAM_BYTES)?;
        let max_bulk_bytes =
            parse_nonzero_u64("EVENTSTASH_MAX_BULK_BYTES", eventstash::MAX_BULK_BYTES)?;

        let writer_capacity = match std::env::var("EVENTSTASH_WRITER_CAPACITY") {
            Ok(val) => val
                .parse::<usize>()
                .map_err(|e| format!("EVENTSTASH_WRITER_CAPACITY is not a valid usize: {e}"))?,
            Err(_) => DEFAULT_WRITER_CAPACITY,
        };
        let writer_capacity = NonZeroUsize::new(writer_capacity)
            .ok_or_else(|| "EVENTSTASH_WRITER_CAPACITY must be nonzero".to_string())?;

        Ok(Config {
            data_path,
            listen_addr,
            metrics_addr,
            max_stream_bytes,
            max_bulk_bytes,
            writer_capacity,
        })
    }
}

/// Initialize the global `tracing` subscriber with an `EnvFilter`.
///
/// Reads `RUST_LOG`, defaulting to `"info"`. Uses `try_init()` so repeated
/// calls are a silent no-op.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Waits for a shutdown signal: SIGINT on all platforms, plus SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing.
    init_tracing();

    // 2. Read configuration from environment variables.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(1);
        }
    };

    tracing::info!(data_path = %config.data_path.display(), "Data path");
    tracing::info!(listen_addr = %config.listen_addr, "Listen address");
    tracing::info!(
        max_stream_bytes = config.max_stream_bytes.get(),
        max_bulk_bytes = config.max_bulk_bytes.get(),
        "Storage ceilings"
    );

    // 3. Metrics, if requested.
    if let Some(metrics_addr) = config.metrics_addr {
        match eventstash::metrics::install_recorder() {
            Ok(handle) => {
                eventstash::metrics::serve_metrics(handle, metrics_addr);
            }
            Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
        }
    }

    // 4. Open the store.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let options = StoreOptions {
        max_stream_bytes: config.max_stream_bytes.get(),
        max_bulk_bytes: config.max_bulk_bytes.get(),
        clock: clock.clone(),
    };
    let store = match Store::open_with(&config.data_path, options) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open store");
            std::process::exit(1);
        }
    };

    // 5. Spawn the writer task.
    let (writer_handle, read_handle, join_handle) =
        spawn_writer(store, config.writer_capacity.get());

    // 6. Bind and serve until a shutdown signal arrives.
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(
                addr = %config.listen_addr,
                error = %e,
                "Failed to bind listener"
            );
            std::process::exit(1);
        });

    let state = AppState::new(writer_handle, read_handle, clock);
    if let Err(e) = service::serve(listener, state, shutdown_signal()).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    // The router (and every WriterHandle clone in it) is gone once serve
    // returns, so the writer drains its queue and exits.
    tracing::info!("Shutting down");
    if let Err(e) = join_handle.await {
        tracing::error!(error = %e, "Writer task panicked");
        std::process::exit(1);
    }
}
