//! Route handlers.
//!
//! `POST /run-system` validates the body, then commits to an SSE response:
//!
//! ```text
//! data: start
//!
//! data: <stdout line>
//!
//! data: ERR: <stderr line>
//!
//! data: DONE
//!
//! ```
//!
//! Validation failures are plain `400` responses. Once the SSE headers are
//! out, failures can only be reported in-band (`Error starting command: ...`).

use crate::error::RequestError;
use crate::server::AppState;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use jailstream_core::{EventSink, OutputEvent, stream_command};
use serde::Deserialize;
use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Body of `POST /run-system`.
///
/// ```json
/// { "cmd": "nmap -sV scanme.nmap.org" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    /// Handed whole to the sandboxed shell. A missing field is treated as empty.
    #[serde(default)]
    pub cmd: String,
}

impl ExecutionRequest {
    /// Parses and validates a request body. The content type is not checked.
    pub fn from_body(body: &[u8]) -> Result<Self, RequestError> {
        let request: Self = serde_json::from_slice(body)?;
        if request.cmd.is_empty() {
            return Err(RequestError::EmptyCommand);
        }
        Ok(request)
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Placeholder route: accepts the request and does nothing.
pub async fn handle_run_wasm(body: Bytes) -> StatusCode {
    debug!(bytes = body.len(), "run-wasm is not implemented; request ignored");
    StatusCode::OK
}

/// Runs the command in the sandbox and streams its output as SSE.
pub async fn handle_run_system(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    debug!(body = %String::from_utf8_lossy(&body), "Received run-system request");

    let request = match ExecutionRequest::from_body(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting run-system request: {}", e);
            return e.into_response();
        }
    };

    let request_id = Uuid::new_v4();
    let (sink, rx) = EventSink::channel();
    let cancel = CancellationToken::new();

    // The channel is empty, so `start` is queued ahead of anything the process writes.
    if sink.send(OutputEvent::start()).await.is_err() {
        warn!(request_id = %request_id, "Event channel closed before start");
    }

    let supervisor = Arc::clone(&state.supervisor);
    let task_cancel = cancel.clone();
    let span = info_span!("run_system", request_id = %request_id);
    tokio::spawn(
        async move {
            match stream_command(&supervisor, &request.cmd, sink, task_cancel).await {
                Ok(status) => info!(status = %status, "Sandboxed command finished"),
                Err(e) => warn!("Sandboxed command failed: {}", e),
            }
        }
        .instrument(span),
    );

    sse_response(rx, cancel.drop_guard(), state.keep_alive)
}

fn sse_response(
    rx: mpsc::Receiver<OutputEvent>,
    guard: DropGuard,
    keep_alive: Option<Duration>,
) -> Response {
    let events = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(sse_event(&event)));

    let sse = Sse::new(CancelOnDrop {
        inner: events,
        _guard: guard,
    });

    let mut response = match keep_alive {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => sse.into_response(),
    };
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

fn sse_event(event: &OutputEvent) -> Event {
    // SSE field values cannot hold a bare CR; treat it as a line break.
    let text = event
        .to_wire_text()
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    Event::default().data(text)
}

/// Cancels the request when the response stream is dropped (client gone).
struct CancelOnDrop<S> {
    inner: S,
    _guard: DropGuard,
}

impl<S: Stream + Unpin> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
