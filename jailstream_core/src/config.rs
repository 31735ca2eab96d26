//! Invocation settings for the external sandbox tool.

/// Default sandbox tool.
pub const DEFAULT_SANDBOX_PROGRAM: &str = "firejail";
/// Keeps the sandbox tool from printing its own banner into the feed.
pub const DEFAULT_QUIET_FLAG: &str = "--quiet";
/// The profile path is appended directly to this flag.
pub const DEFAULT_PROFILE_FLAG: &str = "--profile=";
/// Interpreter that receives the literal command string via `-c`.
pub const DEFAULT_SHELL: &str = "bash";

/// Wrapper that forces line buffering on the inner shell's stdout and stderr.
/// Without it most programs block-buffer when writing to a pipe and nothing
/// reaches the client until they exit.
pub fn default_line_buffering() -> Vec<String> {
    vec!["stdbuf".into(), "-oL".into(), "-eL".into()]
}

/// How a command is wrapped before it is spawned:
///
/// ```text
/// <program> [program_args...] [quiet_flag] <profile_flag><profile> [line_buffering...] <shell> -c <command>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Sandbox executable, looked up on `PATH` when not absolute.
    pub program: String,
    /// Arguments placed before every sandbox flag, e.g. a wrapper script path.
    pub program_args: Vec<String>,
    /// Non-interactive flag; `None` omits it.
    pub quiet_flag: Option<String>,
    /// Prefix the resolved profile path is joined to.
    pub profile_flag: String,
    /// Program and arguments placed in front of the shell. Empty disables it.
    pub line_buffering: Vec<String>,
    pub shell: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_SANDBOX_PROGRAM.to_string(),
            program_args: Vec::new(),
            quiet_flag: Some(DEFAULT_QUIET_FLAG.to_string()),
            profile_flag: DEFAULT_PROFILE_FLAG.to_string(),
            line_buffering: default_line_buffering(),
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

impl SandboxConfig {
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn without_line_buffering(mut self) -> Self {
        self.line_buffering.clear();
        self
    }
}
