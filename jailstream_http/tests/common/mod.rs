//! Shared helpers for the HTTP integration tests.
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use jailstream_core::test_utils::FakeSandbox;
use jailstream_core::Supervisor;
use jailstream_http::{AppState, build_router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

pub const FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Router wired to the fake sandbox tool, without keep-alive comments.
pub fn app_for(supervisor: Supervisor) -> Router {
    build_router(Arc::new(AppState::new(supervisor, None)))
}

pub fn run_system_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/run-system")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub fn command_request(cmd: &str) -> Request<Body> {
    run_system_request(serde_json::json!({ "cmd": cmd }).to_string())
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = tokio::time::timeout(
        FEED_TIMEOUT,
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("event feed did not finish")
    .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Splits an SSE body into the text of its `data:` events.
/// Comment lines (keep-alives) are skipped; multi-line data is joined with `\n`.
pub fn parse_events(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|block| {
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data: "))
                .collect();
            (!data.is_empty()).then(|| data.join("\n"))
        })
        .collect()
}

/// Runs `cmd` through `/run-system` and returns the event texts.
pub async fn run_feed(sandbox: &FakeSandbox, cmd: &str) -> Vec<String> {
    let response = send(app_for(sandbox.supervisor()), command_request(cmd)).await;
    assert_eq!(response.status(), 200);
    parse_events(&body_text(response).await)
}

/// A real listener on a random loopback port.
pub async fn spawn_server(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}
