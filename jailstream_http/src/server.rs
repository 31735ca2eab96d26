//! HTTP server setup

use crate::error::{Result, ServerError};
use crate::request_handler::{handle_run_system, handle_run_wasm, health_check};
use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use jailstream_core::{DEFAULT_PROFILE_NAME, ProfileLocator, SandboxConfig, Supervisor};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:9000";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;

/// Configuration for the streaming server.
///
/// # Example
///
/// ```rust
/// use jailstream_http::ServerConfig;
///
/// let config = ServerConfig {
///     bind_addr: "0.0.0.0:9000".parse().unwrap(),
///     profile_name: "restricted.profile".into(),
///     ..Default::default()
/// };
/// assert_eq!(config.sandbox.program, "firejail");
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Port 0 binds a random free port.
    pub bind_addr: SocketAddr,

    /// How commands are wrapped in the sandbox tool.
    pub sandbox: SandboxConfig,

    /// File name of the sandbox profile, located via [`ProfileLocator::from_env`].
    pub profile_name: String,

    /// Interval of SSE keep-alive comments; `None` disables them.
    pub keep_alive: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            sandbox: SandboxConfig::default(),
            profile_name: DEFAULT_PROFILE_NAME.to_string(),
            keep_alive: Some(Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS)),
        }
    }
}

/// Shared state for the handlers
pub struct AppState {
    pub(crate) supervisor: Arc<Supervisor>,
    pub(crate) keep_alive: Option<Duration>,
}

impl AppState {
    pub fn new(supervisor: Supervisor, keep_alive: Option<Duration>) -> Self {
        Self {
            supervisor: Arc::new(supervisor),
            keep_alive,
        }
    }
}

/// Browsers on any origin may call the service.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE, header::ACCEPT]))
}

/// Builds the router: `/run-system`, the `/run-wasm` placeholder and `/health`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/run-system", post(handle_run_system))
        .route("/run-wasm", post(handle_run_wasm))
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the server and runs until Ctrl-C.
///
/// The profile lookup (`SANDBOX_PROFILE_DIR` and the working directory) is
/// captured once here and handed to the [`Supervisor`].
///
/// The bound port is printed to stderr as `JAILSTREAM_BOUND_PORT=<port>`.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    start_server_with_shutdown(config, shutdown_signal()).await
}

/// Like [`start_server`], stopping when `shutdown` completes.
pub async fn start_server_with_shutdown<F>(config: ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting jailstream on {}", config.bind_addr);

    if !config.bind_addr.ip().is_loopback() {
        warn!(
            "Listening on non-loopback address {}. Any client that can reach it can run \
             sandboxed commands; restrict access via firewall or reverse proxy.",
            config.bind_addr
        );
    }

    let locator = ProfileLocator::from_env(config.profile_name.as_str());
    match locator.override_dir() {
        Some(dir) => info!("Sandbox profile directory override: {}", dir.display()),
        None => info!(candidates = ?locator.candidates(), "Sandbox profile search paths"),
    }

    let supervisor = Supervisor::new(config.sandbox.clone(), locator);
    let app = build_router(Arc::new(AppState::new(supervisor, config.keep_alive)));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| ServerError::HttpServer(format!("Failed to bind: {}", e)))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| ServerError::HttpServer(format!("Failed to get local addr: {}", e)))?;

    info!(
        "jailstream listening on http://{} (sandbox: {})",
        local_addr, config.sandbox.program
    );

    // Machine-readable bound port for test harnesses.
    eprintln!("JAILSTREAM_BOUND_PORT={}", local_addr.port());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::HttpServer(format!("Server error: {}", e)))?;

    info!("jailstream stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
