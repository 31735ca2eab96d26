//! Client disconnects over a real TCP connection.
#![cfg(target_os = "linux")]

mod common;

use axum::Router;
use common::{parse_events, spawn_server};
use futures::StreamExt;
use jailstream_core::test_utils::FakeSandbox;
use jailstream_http::{AppState, build_router};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SLEEPER: &str = "echo $$; exec sleep 30";

/// Keep-alive comments make the server write to a dead socket promptly.
fn app_with_keep_alive(sandbox: &FakeSandbox) -> Router {
    build_router(Arc::new(AppState::new(
        sandbox.supervisor(),
        Some(Duration::from_millis(200)),
    )))
}

/// Reads the feed until the shell's pid arrives; returns it with the live body stream.
async fn read_until_pid(response: reqwest::Response) -> (u32, impl Sized) {
    let mut body = String::new();
    let mut stream = Box::pin(response.bytes_stream());

    loop {
        let chunk = tokio::time::timeout(Duration::from_secs(10), stream.next())
            .await
            .expect("timed out waiting for the pid line")
            .expect("stream ended before the pid line")
            .unwrap();
        body.push_str(&String::from_utf8_lossy(&chunk));

        let complete = body.rfind("\n\n").map_or("", |end| &body[..end]);
        let pid = parse_events(complete)
            .iter()
            .find_map(|event| event.parse::<u32>().ok());
        if let Some(pid) = pid {
            return (pid, stream);
        }
    }
}

async fn wait_for_exit(pid: u32) -> bool {
    let proc_dir = format!("/proc/{pid}");
    for _ in 0..100 {
        if !Path::new(&proc_dir).exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_client_disconnect_kills_the_process() {
    let sandbox = FakeSandbox::new().unwrap();
    let (addr, server) = spawn_server(app_with_keep_alive(&sandbox)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/run-system"))
        .json(&serde_json::json!({ "cmd": SLEEPER }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let (pid, handle) = read_until_pid(response).await;
    assert!(Path::new(&format!("/proc/{pid}")).exists());

    drop(handle);

    assert!(
        wait_for_exit(pid).await,
        "process {pid} survived the client disconnect"
    );
    server.abort();
}

#[tokio::test]
async fn test_server_keeps_serving_after_a_disconnect() {
    let sandbox = FakeSandbox::new().unwrap();
    let (addr, server) = spawn_server(app_with_keep_alive(&sandbox)).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/run-system");

    let abandoned = client
        .post(&url)
        .json(&serde_json::json!({ "cmd": SLEEPER }))
        .send()
        .await
        .unwrap();
    let (pid, handle) = read_until_pid(abandoned).await;
    drop(handle);
    assert!(wait_for_exit(pid).await);

    let body = client
        .post(&url)
        .json(&serde_json::json!({ "cmd": "echo still-here" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(parse_events(&body), vec!["start", "still-here", "DONE"]);
    server.abort();
}
