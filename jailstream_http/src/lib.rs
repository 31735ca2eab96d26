//! # Jailstream HTTP
//!
//! HTTP front end for the sandboxed execution engine in `jailstream_core`.
//!
//! ## Endpoints
//!
//! *   **`POST /run-system`**: body `{"cmd": "<shell command>"}`. The command runs
//!     inside the sandbox tool and its output is streamed back as Server-Sent
//!     Events: `start`, one event per output line (`ERR: ` prefix for stderr),
//!     then `DONE`.
//! *   **`POST /run-wasm`**: placeholder; accepted and ignored.
//! *   **`GET /health`**: liveness probe.
//!
//! Malformed bodies and empty commands are rejected with `400` before any
//! streaming header is sent.
//!
//! ## Example
//!
//! ```rust,no_run
//! use jailstream_http::{ServerConfig, start_server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:9000".parse().unwrap(),
//!         ..ServerConfig::default()
//!     };
//!     start_server(config).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod request_handler;
pub mod server;

pub use error::{RequestError, Result, ServerError};
pub use request_handler::ExecutionRequest;
pub use server::{
    AppState, DEFAULT_BIND_ADDR, DEFAULT_KEEP_ALIVE_SECS, ServerConfig, build_router,
    start_server, start_server_with_shutdown,
};
