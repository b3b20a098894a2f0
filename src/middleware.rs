//! Request logging and usage metrics middleware.
//!
//! [`request_logging`] wraps every route of the API router. For each
//! request it:
//!
//! - makes sure the request carries an `OSC-DM-Correlation-ID` (a UUID v4 is
//!   generated when missing) and an `OSC-DM-Username` (`unknown` when
//!   missing), and echoes both on the response;
//! - logs a `TRACE-<n>:<correlation>-REQ` record with method, URL, headers,
//!   query parameters and a snapshot of the body;
//! - counts the response under `[username][url][status]` in the
//!   [`MetricsTable`](crate::state::MetricsTable);
//! - logs a `TRACE-<n>:<correlation>-RSP` record with status, headers and
//!   the response body, then advances the trace counter.
//!
//! Request bodies are read up to the configured limit
//! ([`STATE_MAX_BODY_BYTES`], 2 MiB by default). A larger body is answered
//! with `413` without reaching the handler.
//!
//! Response bodies with a known exact size are buffered before logging; if
//! such a body fails to read, the client gets an empty `500`.
//! Any other body is treated as a stream: chunks are forwarded to the client
//! as they arrive and the joined body is logged once the stream ends.
//!
//! Logging and metrics never fail the request.

use axum::{
    body::{to_bytes, Body, Bytes, HttpBody},
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use futures::StreamExt;
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::state::{StateRegistry, STATE_MAX_BODY_BYTES};

pub const HEADER_USERNAME: &str = "OSC-DM-Username";
pub const HEADER_CORRELATION_ID: &str = "OSC-DM-Correlation-ID";
pub const USERNAME_UNKNOWN: &str = "unknown";

fn username_header() -> HeaderName {
    HeaderName::from_static("osc-dm-username")
}

fn correlation_header() -> HeaderName {
    HeaderName::from_static("osc-dm-correlation-id")
}

/// A response body captured for logging.
#[derive(Debug, Clone)]
pub enum LoggedBody {
    /// Body that was fully available when the handler returned.
    Buffered(Bytes),
    /// Chunks of a streamed body, in delivery order.
    Streamed(Vec<Bytes>),
}

impl LoggedBody {
    /// Decodes the captured bytes as UTF-8 (lossy) for the log record.
    pub fn materialize(&self) -> String {
        match self {
            LoggedBody::Buffered(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            LoggedBody::Streamed(chunks) => {
                let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
                String::from_utf8_lossy(&joined).into_owned()
            }
        }
    }
}

/// Axum middleware; install with
/// `axum::middleware::from_fn_with_state(state, request_logging)`.
pub async fn request_logging(
    State(state): State<Arc<StateRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let url = parts.uri.to_string();

    let correlation_id = ensure_header(&mut parts.headers, correlation_header(), &url, || {
        uuid::Uuid::new_v4().to_string()
    });
    let username = ensure_header(&mut parts.headers, username_header(), &url, || {
        USERNAME_UNKNOWN.to_string()
    });
    let cid = header_text(&correlation_id);
    let user = header_text(&username);

    let mut rejection = None;
    let (body, body_snapshot) = if is_side_effect_free(&parts.method) {
        (body, Value::Object(Default::default()))
    } else {
        match to_bytes(body, max_body_bytes(&state)).await {
            Ok(bytes) => {
                let snapshot = snapshot_body(&bytes);
                (Body::from(bytes), snapshot)
            }
            Err(e) => {
                let message = format!("Failed to read body: {}", e);
                let status = if is_length_limit(&e) {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                rejection = Some((status, message.clone()));
                (Body::empty(), Value::String(message))
            }
        }
    };

    let trace_id = state.current_trace_id();
    let parameters = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
        .map(|q| q.0)
        .unwrap_or_default();

    tracing::info!(
        trace_id,
        correlation_id = %cid,
        method = %parts.method,
        url = %url,
        headers = ?headers_for_log(&parts.headers),
        parameters = ?parameters,
        body = %body_snapshot,
        "TRACE-{}:{}-REQ",
        trace_id,
        cid
    );

    let response = match rejection {
        Some(rejected) => rejected.into_response(),
        None => next.run(Request::from_parts(parts, body)).await,
    };

    let (mut parts, body) = response.into_parts();
    parts.headers.insert(correlation_header(), correlation_id);
    parts.headers.insert(username_header(), username);

    let outgoing = if body.size_hint().exact().is_some() {
        match to_bytes(body, usize::MAX).await {
            Ok(bytes) => Outgoing::Buffered(bytes),
            Err(e) => {
                tracing::error!(
                    trace_id,
                    correlation_id = %cid,
                    status = parts.status.as_u16(),
                    error = %e,
                    "failed to read response body, replying 500"
                );
                parts.status = StatusCode::INTERNAL_SERVER_ERROR;
                parts.headers.remove(header::CONTENT_LENGTH);
                parts.headers.remove(header::CONTENT_TYPE);
                Outgoing::Buffered(Bytes::new())
            }
        }
    } else {
        Outgoing::Streamed(body)
    };

    let status = parts.status;
    let count = state.record_metric(&user, &url, status.as_u16());
    tracing::debug!(username = %user, url = %url, status = status.as_u16(), count, "metrics updated");

    let log = ResponseLog {
        trace_id,
        correlation_id: cid,
        status,
        headers: headers_for_log(&parts.headers),
    };

    let body = match outgoing {
        Outgoing::Buffered(bytes) => {
            log.emit(&LoggedBody::Buffered(bytes.clone()));
            Body::from(bytes)
        }
        Outgoing::Streamed(body) => tee_body(body, move |logged| log.emit(&logged)),
    };

    state.advance_trace_id();

    Response::from_parts(parts, body)
}

/// Request body limit stored in `state`, or [`DEFAULT_MAX_BODY_BYTES`].
pub fn max_body_bytes(state: &StateRegistry) -> usize {
    state
        .get::<usize>(STATE_MAX_BODY_BYTES)
        .unwrap_or(DEFAULT_MAX_BODY_BYTES)
}

fn is_length_limit(err: &axum::Error) -> bool {
    std::error::Error::source(err).is_some_and(|inner| inner.is::<LengthLimitError>())
}

/// Response body on its way back to the client.
enum Outgoing {
    Buffered(Bytes),
    Streamed(Body),
}

/// Re-streams `body` chunk by chunk while keeping a copy of every chunk;
/// `on_complete` receives the copies once the stream is exhausted.
///
/// If the client goes away before the end of the stream, `on_complete` is
/// not called.
pub fn tee_body<F>(body: Body, on_complete: F) -> Body
where
    F: FnOnce(LoggedBody) + Send + 'static,
{
    let mut upstream = body.into_data_stream();
    let stream = async_stream::stream! {
        let mut chunks = Vec::new();
        while let Some(item) = upstream.next().await {
            if let Ok(chunk) = &item {
                chunks.push(chunk.clone());
            }
            yield item;
        }
        on_complete(LoggedBody::Streamed(chunks));
    };
    Body::from_stream(stream)
}

struct ResponseLog {
    trace_id: u64,
    correlation_id: String,
    status: StatusCode,
    headers: BTreeMap<String, String>,
}

impl ResponseLog {
    fn emit(&self, body: &LoggedBody) {
        tracing::info!(
            trace_id = self.trace_id,
            correlation_id = %self.correlation_id,
            status_code = self.status.as_u16(),
            headers = ?self.headers,
            body = %body.materialize(),
            "TRACE-{}:{}-RSP",
            self.trace_id,
            self.correlation_id
        );
    }
}

fn is_side_effect_free(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}

/// Returns the value of `name`, inserting `generate()` first when absent.
fn ensure_header(
    headers: &mut HeaderMap,
    name: HeaderName,
    url: &str,
    generate: impl FnOnce() -> String,
) -> HeaderValue {
    if let Some(value) = headers.get(&name) {
        return value.clone();
    }

    tracing::warn!(header = %name, url, "Missing header");
    let generated = generate();
    let value = HeaderValue::from_str(&generated)
        .unwrap_or_else(|_| HeaderValue::from_static(USERNAME_UNKNOWN));
    headers.insert(name.clone(), value.clone());
    tracing::warn!(header = %name, value = %generated, url, "Added header");
    value
}

fn header_text(value: &HeaderValue) -> String {
    String::from_utf8_lossy(value.as_bytes()).into_owned()
}

fn headers_for_log(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), header_text(v)))
        .collect()
}

/// Loggable form of a request body: JSON when it parses, else UTF-8 text,
/// else base64 of the raw bytes.
pub fn snapshot_body(bytes: &[u8]) -> Value {
    if let Ok(json) = serde_json::from_slice::<Value>(bytes) {
        return json;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use http_body_util::{Full, Limited};
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn logged_router(state: Arc<StateRegistry>) -> Router {
        Router::new()
            .route(
                "/broken",
                // Exact size hint of 4 bytes, but the body errors while reading.
                get(|| async { Body::new(Limited::new(Full::new(Bytes::from("hello world")), 4)) }),
            )
            .route("/echo", post(|body: Bytes| async move { body }))
            .layer(axum::middleware::from_fn_with_state(state, request_logging))
    }

    #[test]
    fn test_snapshot_json() {
        let v = snapshot_body(br#"{"query":"rain"}"#);
        assert_eq!(v["query"], "rain");
    }

    #[test]
    fn test_snapshot_text() {
        assert_eq!(snapshot_body(b"plain words"), Value::String("plain words".into()));
    }

    #[test]
    fn test_snapshot_binary_is_base64() {
        let v = snapshot_body(&[0xff, 0xfe, 0x00]);
        assert_eq!(v, Value::String("//4A".into()));
    }

    #[test]
    fn test_materialize_joins_chunks() {
        let body = LoggedBody::Streamed(vec![Bytes::from("ab"), Bytes::from("cd")]);
        assert_eq!(body.materialize(), "abcd");
        let body = LoggedBody::Buffered(Bytes::from("xyz"));
        assert_eq!(body.materialize(), "xyz");
    }

    #[tokio::test]
    async fn test_tee_body_forwards_chunks_and_reports_body() {
        let source = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from("ab")),
            Ok(Bytes::from("cd")),
        ]);
        let logged: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let sink = logged.clone();

        let body = tee_body(Body::from_stream(source), move |b| {
            *sink.lock().unwrap() = Some(b.materialize());
        });

        let delivered: Vec<Bytes> = body
            .into_data_stream()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(delivered, vec![Bytes::from("ab"), Bytes::from("cd")]);
        assert_eq!(logged.lock().unwrap().as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_unreadable_response_body_becomes_500() {
        let state = Arc::new(StateRegistry::new());
        let response = logged_router(state.clone())
            .oneshot(Request::get("/broken").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(HEADER_CORRELATION_ID));
        assert_eq!(state.metrics()["unknown"]["/broken"][&500], 1);
        assert_eq!(state.current_trace_id(), 1);
    }

    #[tokio::test]
    async fn test_request_body_over_limit_is_rejected_with_413() {
        let state = Arc::new(StateRegistry::new());
        state.set(STATE_MAX_BODY_BYTES, 8usize);
        let app = logged_router(state.clone());

        let response = app
            .clone()
            .oneshot(Request::post("/echo").body(Body::from("0123456789")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(response.headers().contains_key(HEADER_USERNAME));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Failed to read body: length limit exceeded");

        let response = app
            .oneshot(Request::post("/echo").body(Body::from("01234567")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"01234567");

        let metrics = state.metrics();
        assert_eq!(metrics["unknown"]["/echo"][&413], 1);
        assert_eq!(metrics["unknown"]["/echo"][&200], 1);
    }

    #[test]
    fn test_max_body_bytes_defaults_to_two_mib() {
        let state = StateRegistry::new();
        assert_eq!(max_body_bytes(&state), 2 * 1024 * 1024);
        state.set(STATE_MAX_BODY_BYTES, 16usize);
        assert_eq!(max_body_bytes(&state), 16);
    }

    #[test]
    fn test_ensure_header_keeps_existing_value() {
        let mut headers = HeaderMap::new();
        headers.insert(correlation_header(), HeaderValue::from_static("abc"));
        let v = ensure_header(&mut headers, correlation_header(), "/", || "new".into());
        assert_eq!(v.to_str().unwrap(), "abc");
    }

    #[test]
    fn test_ensure_header_injects_generated_value() {
        let mut headers = HeaderMap::new();
        let v = ensure_header(&mut headers, username_header(), "/", || USERNAME_UNKNOWN.into());
        assert_eq!(v.to_str().unwrap(), USERNAME_UNKNOWN);
        assert_eq!(
            headers.get(HEADER_USERNAME).unwrap().to_str().unwrap(),
            USERNAME_UNKNOWN
        );
    }
}
