//! # Jailstream Core
//!
//! The sandboxed execution and streaming engine behind the `jailstream` HTTP
//! service.
//!
//! A request's command string is launched inside an external sandbox tool
//! (`firejail` by default) under a named profile file, and its stdout/stderr
//! are streamed back line by line as [`OutputEvent`]s.
//!
//! ## Components
//!
//! *   **[`profile`]**: locates the sandbox profile (`SANDBOX_PROFILE_DIR`,
//!     then working-directory candidates, then the bare name).
//! *   **[`supervisor`]**: builds the sandbox invocation, spawns the child and
//!     owns it until it is reaped.
//! *   **[`multiplexer`]**: drains both pipes concurrently into a single-writer
//!     [`EventSink`] and emits the terminal `DONE` once both drains finished
//!     and the process exited.
//!
//! ## Example
//!
//! ```rust,no_run
//! use jailstream_core::{
//!     EventSink, ProfileLocator, SandboxConfig, Supervisor, stream_command,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let supervisor = Supervisor::new(
//!     SandboxConfig::default(),
//!     ProfileLocator::from_env("system.profile"),
//! );
//! let (sink, mut events) = EventSink::channel();
//! tokio::spawn(async move {
//!     let _ = stream_command(&supervisor, "echo hello", sink, CancellationToken::new()).await;
//! });
//! while let Some(event) = events.recv().await {
//!     println!("data: {}", event.to_wire_text());
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod multiplexer;
pub mod profile;
pub mod supervisor;
pub mod test_utils;

pub use config::SandboxConfig;
pub use error::{Result, SandboxError};
pub use event::{Origin, OutputEvent};
pub use multiplexer::{
    DrainOutcome, EventSink, MAX_LINE_BYTES, drain, finalize, run, stream_command,
};
pub use profile::{DEFAULT_PROFILE_NAME, PROFILE_DIR_ENV, ProfileLocator, ProfileResolution};
pub use supervisor::{SandboxedProcess, Supervisor};
