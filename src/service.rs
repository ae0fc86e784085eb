//! HTTP service layer for eventstash.
//!
//! Thin axum glue over the storage core: each handler parses the request,
//! resolves the namespace, and hands off to the writer task (mutations) or a
//! [`ReadHandle`] (reads).
//!
//! | Method | Path      | Query    | Body                   |
//! |--------|-----------|----------|------------------------|
//! | POST   | `/stream` | `user`   | one event              |
//! | POST   | `/bulk`   | `user`   | `{"events": [...]}`    |
//! | GET    | `/list`   | `user`   | --                     |
//! | POST   | `/reset`  | `user`   | --                     |
//! | GET    | `/time`   | --       | --                     |
//!
//! Every response carries permissive CORS headers, and `OPTIONS` on any path
//! is answered with `204 No Content`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics::counter;
use serde::Serialize;

use crate::clock::{self, Clock};
use crate::error::Error;
use crate::namespace::Namespace;
use crate::reader::ReadHandle;
use crate::types::{BulkDocument, Event};
use crate::writer::WriterHandle;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Handle for submitting mutations to the writer task.
    pub writer: WriterHandle,
    /// Read-only view of the data root.
    pub reader: ReadHandle,
    /// Time source for `GET /time`.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(writer: WriterHandle, reader: ReadHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            writer,
            reader,
            clock,
        }
    }
}

/// Request failures, rendered as plain-text bodies.
#[derive(Debug)]
pub enum ApiError {
    /// The body is not valid JSON of the expected shape.
    InvalidJson,
    /// A bulk request carried no events.
    NoEvents,
    /// A bulk merge would exceed the document ceiling.
    StorageLimit,
    /// Writing to disk failed.
    WriteFailed,
    /// The server cannot process the request (writer gone, task panicked).
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(_) | Error::Encode(_) => ApiError::WriteFailed,
            Error::StorageLimit { .. } => ApiError::StorageLimit,
            Error::EmptyBatch => ApiError::NoEvents,
            Error::InvalidArgument(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidJson => (StatusCode::BAD_REQUEST, "invalid json"),
            ApiError::NoEvents => (StatusCode::BAD_REQUEST, "no events"),
            ApiError::StorageLimit => (StatusCode::BAD_REQUEST, "storage limit reached"),
            ApiError::WriteFailed => (StatusCode::INTERNAL_SERVER_ERROR, "write error"),
            ApiError::Internal(reason) => {
                tracing::error!(reason = %reason, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };
        text_response(status, message)
    }
}

fn text_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, TEXT_CONTENT_TYPE),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        format!("{message}\n"),
    )
        .into_response()
}

/// Serialize `value` as a JSON body terminated by a newline.
fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(mut body) => {
            body.push(b'\n');
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
                body,
            )
                .into_response()
        }
        Err(e) => ApiError::Internal(format!("response encoding failed: {e}")).into_response(),
    }
}

/// The `?user=` query parameter.
///
/// Only the first `user` pair counts, and a query that cannot be decoded
/// reads as having no `user` at all, so extraction never rejects a request.
#[derive(Debug, Default)]
pub struct UserParams {
    pub user: Option<String>,
}

impl UserParams {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let user = pairs
            .into_iter()
            .find(|(key, _)| key == "user")
            .map(|(_, value)| value);
        Self { user }
    }

    fn namespace(&self) -> Namespace {
        Namespace::new(self.user.as_deref().unwrap_or_default())
    }
}

impl<S> FromRequestParts<S> for UserParams
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pairs = match Query::<Vec<(String, String)>>::try_from_uri(&parts.uri) {
            Ok(Query(pairs)) => pairs,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable query string");
                Vec::new()
            }
        };
        Ok(Self::from_pairs(pairs))
    }
}

#[derive(Debug, Serialize)]
struct StreamAccepted {
    ok: bool,
    #[serde(rename = "serverTime")]
    server_time: String,
}

#[derive(Debug, Serialize)]
struct BulkAccepted {
    ok: bool,
    #[serde(rename = "savedAt")]
    saved_at: String,
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct TimeResponse {
    #[serde(rename = "serverTime")]
    server_time: String,
}

/// Handle POST /stream
///
/// The namespace comes from the event's `user`, or from `?user=` when that
/// sanitizes to the fallback.
pub async fn handle_stream(
    State(state): State<AppState>,
    params: UserParams,
    body: Bytes,
) -> Result<Response, ApiError> {
    let event: Event = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson)?;
    let namespace = Namespace::resolve(&event.user, params.user.as_deref());

    let appended = state.writer.append(namespace, event).await?;

    Ok(json_response(&StreamAccepted {
        ok: true,
        server_time: appended.event.server_time,
    }))
}

/// Handle POST /bulk
///
/// The namespace comes from the first event's `user`, or from `?user=` when
/// that sanitizes to the fallback. A `savedAt` in the body is ignored.
pub async fn handle_bulk(
    State(state): State<AppState>,
    params: UserParams,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: BulkDocument =
        serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson)?;
    let Some(first) = payload.events.first() else {
        return Err(ApiError::NoEvents);
    };
    let namespace = Namespace::resolve(&first.user, params.user.as_deref());

    let merged = state.writer.merge(namespace, payload.events).await?;

    Ok(json_response(&BulkAccepted {
        ok: true,
        saved_at: merged.saved_at,
    }))
}

/// Handle GET /list
///
/// Always succeeds; unreadable data reads as empty.
pub async fn handle_list(
    State(state): State<AppState>,
    params: UserParams,
) -> Result<Response, ApiError> {
    counter!("eventstash_reads_total").increment(1);
    let namespace = params.namespace();
    let reader = state.reader.clone();

    let snapshot = tokio::task::spawn_blocking(move || reader.read(&namespace))
        .await
        .map_err(|e| ApiError::Internal(format!("read task failed: {e}")))?;

    Ok(json_response(&snapshot))
}

/// Handle POST /reset
pub async fn handle_reset(
    State(state): State<AppState>,
    params: UserParams,
) -> Result<Response, ApiError> {
    state.writer.reset(params.namespace()).await?;
    Ok(json_response(&Ack { ok: true }))
}

/// Handle GET /time
pub async fn handle_time(State(state): State<AppState>) -> Response {
    json_response(&TimeResponse {
        server_time: clock::format_timestamp(state.clock.now()),
    })
}

async fn handle_not_found() -> Response {
    text_response(StatusCode::NOT_FOUND, "404 page not found")
}

async fn handle_method_not_allowed() -> Response {
    text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

/// Add CORS headers to every response and answer preflight requests.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream", post(handle_stream))
        .route("/bulk", post(handle_bulk))
        .route("/list", get(handle_list))
        .route("/reset", post(handle_reset))
        .route("/time", get(handle_time))
        .method_not_allowed_fallback(handle_method_not_allowed)
        .fallback(handle_not_found)
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    match listener.local_addr() {
        Ok(addr) => tracing::info!("Server listening on {addr}"),
        Err(e) => tracing::warn!(error = %e, "Listener has no local address"),
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[test]
    fn store_errors_map_to_api_errors() {
        let io = Error::Io(std::io::Error::other("disk full"));
        assert!(matches!(ApiError::from(io), ApiError::WriteFailed));
        let limit = Error::StorageLimit { size: 2, max: 1 };
        assert!(matches!(ApiError::from(limit), ApiError::StorageLimit));
        assert!(matches!(ApiError::from(Error::EmptyBatch), ApiError::NoEvents));
        let closed = Error::InvalidArgument("writer task closed".into());
        assert!(matches!(ApiError::from(closed), ApiError::Internal(_)));
    }

    #[tokio::test]
    async fn api_errors_render_plain_text() {
        let cases = [
            (ApiError::InvalidJson, StatusCode::BAD_REQUEST, "invalid json\n"),
            (ApiError::NoEvents, StatusCode::BAD_REQUEST, "no events\n"),
            (
                ApiError::StorageLimit,
                StatusCode::BAD_REQUEST,
                "storage limit reached\n",
            ),
            (
                ApiError::WriteFailed,
                StatusCode::INTERNAL_SERVER_ERROR,
                "write error\n",
            ),
        ];
        for (err, status, body) in cases {
            let response = err.into_response();
            assert_eq!(response.status(), status);
            assert_eq!(
                response.headers().get(header::CONTENT_TYPE).unwrap(),
                TEXT_CONTENT_TYPE
            );
            assert_eq!(body_text(response).await, body);
        }
    }

    #[tokio::test]
    async fn json_response_ends_with_newline() {
        let response = json_response(&Ack { ok: true });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_CONTENT_TYPE
        );
        assert_eq!(body_text(response).await, "{\"ok\":true}\n");
    }

    #[test]
    fn user_params_take_first_user_pair() {
        let pairs = vec![
            ("other".to_string(), "x".to_string()),
            ("user".to_string(), "a".to_string()),
            ("user".to_string(), "b".to_string()),
        ];
        assert_eq!(UserParams::from_pairs(pairs).user.as_deref(), Some("a"));
        assert_eq!(UserParams::from_pairs(Vec::new()).user, None);
    }

    #[tokio::test]
    async fn user_params_extract_from_repeated_query() {
        let (mut parts, ()) = axum::http::Request::builder()
            .uri("/list?user=a&user=b")
            .body(())
            .expect("request")
            .into_parts();
        let params = UserParams::from_request_parts(&mut parts, &())
            .await
            .expect("infallible");
        assert_eq!(params.namespace().as_str(), "a");
    }

    #[test]
    fn user_params_sanitize_to_namespace() {
        let params = UserParams {
            user: Some("b o/b".to_string()),
        };
        assert_eq!(params.namespace().as_str(), "bob");
        assert!(UserParams::default().namespace().is_fallback());
    }
}
