//! # Process Supervisor
//!
//! Launches a command inside the external sandbox tool and owns the resulting
//! child for the lifetime of one request.
//!
//! The command string is handed whole to `<shell> -c`. It is never parsed or
//! validated here; what it may touch is decided entirely by the sandbox
//! profile.
//!
//! ## Lifecycle
//!
//! 1. [`Supervisor::start`] resolves the profile and spawns the child with
//!    piped stdout/stderr and a null stdin.
//! 2. The multiplexer takes both read handles with
//!    [`SandboxedProcess::take_output`] and drains them to end-of-stream.
//! 3. [`SandboxedProcess::wait`] reaps the child. It must run after both
//!    drains have finished: a child blocked on a full pipe never exits.
//!
//! Children are spawned with `kill_on_drop`, so a `SandboxedProcess` dropped on
//! an error path does not leave a running process behind.

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::profile::{ProfileLocator, ProfileResolution};
use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Starts sandboxed processes from an explicit configuration.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SandboxConfig,
    locator: ProfileLocator,
}

impl Supervisor {
    pub fn new(config: SandboxConfig, locator: ProfileLocator) -> Self {
        Self { config, locator }
    }

    /// Resolves the profile for this launch, then spawns the command under it.
    pub fn start(&self, command: &str) -> Result<SandboxedProcess> {
        let profile = self.locator.resolve();
        self.launch(command, profile)
    }

    /// Spawns the command under an already resolved profile.
    pub fn launch(&self, command: &str, profile: ProfileResolution) -> Result<SandboxedProcess> {
        info!(
            command = %command,
            profile = %profile.as_os_str().to_string_lossy(),
            "Executing sandboxed command"
        );

        let mut child = self
            .build_command(command, &profile)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pid = child.id();
        debug!(pid = ?pid, "Sandboxed process started");

        Ok(SandboxedProcess {
            child,
            stdout,
            stderr,
            pid,
        })
    }

    /// Builds the full sandbox invocation for `command`.
    pub fn build_command(&self, command: &str, profile: &ProfileResolution) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.sandbox_args(command, profile))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn sandbox_args(&self, command: &str, profile: &ProfileResolution) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.config.program_args.iter().map(OsString::from).collect();
        if let Some(flag) = &self.config.quiet_flag {
            args.push(flag.into());
        }

        let mut profile_arg = OsString::from(&self.config.profile_flag);
        profile_arg.push(profile.as_os_str());
        args.push(profile_arg);

        args.extend(self.config.line_buffering.iter().map(OsString::from));
        args.push(OsString::from(&self.config.shell));
        args.push("-c".into());
        args.push(command.into());
        args
    }
}

/// A running sandboxed child and its two output pipes.
#[derive(Debug)]
pub struct SandboxedProcess {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    pid: Option<u32>,
}

impl SandboxedProcess {
    /// OS process id captured at spawn time.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Hands out both read handles. Only the first call succeeds.
    pub fn take_output(&mut self) -> Result<(ChildStdout, ChildStderr)> {
        match (self.stdout.take(), self.stderr.take()) {
            (Some(stdout), Some(stderr)) => Ok((stdout, stderr)),
            _ => Err(SandboxError::OutputAlreadyTaken),
        }
    }

    /// Best-effort termination. The child still has to be reaped with [`wait`](Self::wait).
    pub fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            // Already exited; wait() reaps it.
            debug!(pid = ?self.pid, "Kill skipped: {}", e);
        }
    }

    /// Waits for the child to exit and releases its resources.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        // Drop any pipe nobody took so the child cannot block writing to it.
        drop(self.stdout.take());
        drop(self.stderr.take());

        let status = self.child.wait().await.map_err(SandboxError::Wait)?;
        if status.success() {
            debug!(pid = ?self.pid, "Sandboxed process exited cleanly");
        } else {
            warn!(pid = ?self.pid, status = %status, "Sandboxed process exited with failure");
        }
        Ok(status)
    }
}
