use clap::Parser;
use jailstream_core::{DEFAULT_PROFILE_NAME, SandboxConfig};
use jailstream_http::{DEFAULT_KEEP_ALIVE_SECS, ServerConfig, start_server};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Streams the output of shell commands run inside a sandbox.
///
/// Each `POST /run-system` spawns `<sandbox-program> --quiet --profile=<profile>
/// stdbuf -oL -eL <shell> -c <cmd>` and streams its output as Server-Sent Events.
/// Set `SANDBOX_PROFILE_DIR` to choose the profile directory explicitly.
#[derive(Parser, Debug)]
#[command(name = "jailstream")]
#[command(version, about)]
struct Args {
    /// Address to bind the HTTP server.
    #[arg(long, default_value = "127.0.0.1:9000")]
    bind_addr: SocketAddr,

    /// File name of the sandbox profile.
    #[arg(long, default_value = DEFAULT_PROFILE_NAME)]
    profile_name: String,

    /// Sandbox tool used to launch every command.
    #[arg(long, default_value = "firejail")]
    sandbox_program: String,

    /// Shell that receives the command string via `-c`.
    #[arg(long, default_value = "bash")]
    shell: String,

    /// Do not wrap the shell in `stdbuf -oL -eL`.
    /// Output of block-buffering programs then arrives only when they flush.
    #[arg(long)]
    no_line_buffering: bool,

    /// Seconds between SSE keep-alive comments; 0 disables them.
    #[arg(long, default_value_t = DEFAULT_KEEP_ALIVE_SECS)]
    keep_alive_secs: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut sandbox = SandboxConfig::default()
            .with_program(self.sandbox_program)
            .with_shell(self.shell);
        if self.no_line_buffering {
            sandbox = sandbox.without_line_buffering();
        }

        ServerConfig {
            bind_addr: self.bind_addr,
            sandbox,
            profile_name: self.profile_name,
            keep_alive: (self.keep_alive_secs > 0)
                .then(|| Duration::from_secs(self.keep_alive_secs)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config();

    tracing::info!("Sandbox tool: {}", config.sandbox.program);
    tracing::info!("Sandbox profile: {}", config.profile_name);
    if config.sandbox.line_buffering.is_empty() {
        tracing::info!("Line buffering wrapper disabled");
    }

    start_server(config).await?;
    Ok(())
}
