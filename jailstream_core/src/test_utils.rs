//! Test helpers shared by the workspace's test suites.
//!
//! [`FakeSandbox`] writes a small POSIX shell script that accepts the same
//! leading flags as the real sandbox tool (`--quiet`, `--profile=<path>`),
//! rejects a missing profile the way firejail does (message on stderr, exit 1)
//! and otherwise `exec`s the remaining arguments unsandboxed.
//!
//! The script is run as `sh <script>` rather than executed directly, which
//! avoids `ETXTBSY` when another test thread forks while it is being written.

use crate::config::SandboxConfig;
use crate::profile::ProfileLocator;
use crate::supervisor::Supervisor;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const FAKE_SANDBOX_SCRIPT: &str = r#"#!/bin/sh
profile=""
while [ $# -gt 0 ]; do
    case "$1" in
        --quiet) shift ;;
        --profile=*) profile="${1#--profile=}"; shift ;;
        *) break ;;
    esac
done
if [ ! -f "$profile" ]; then
    echo "Error: cannot access profile file: $profile" >&2
    exit 1
fi
exec "$@"
"#;

/// Profile name used by [`FakeSandbox`].
pub const FAKE_PROFILE_NAME: &str = "system.profile";

/// A throwaway directory holding a fake sandbox tool and a profile layout.
pub struct FakeSandbox {
    dir: TempDir,
    program: PathBuf,
}

impl FakeSandbox {
    /// Creates the fake tool and `sandbox_profiles/system.profile`.
    pub fn new() -> io::Result<Self> {
        let dir = TempDir::new()?;
        let program = dir.path().join("fake-sandbox");
        fs::write(&program, FAKE_SANDBOX_SCRIPT)?;

        let profiles = dir.path().join("sandbox_profiles");
        fs::create_dir_all(&profiles)?;
        fs::write(profiles.join(FAKE_PROFILE_NAME), "# test profile\n")?;

        Ok(Self { dir, program })
    }

    /// Search root for [`ProfileLocator`].
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the fake tool script.
    pub fn script(&self) -> &Path {
        &self.program
    }

    /// Invocation settings that run the fake tool and `sh`, without `stdbuf`.
    pub fn config(&self) -> SandboxConfig {
        SandboxConfig {
            program_args: vec![self.program.to_string_lossy().into_owned()],
            ..SandboxConfig::default()
                .with_program("sh")
                .with_shell("sh")
                .without_line_buffering()
        }
    }

    /// A locator that finds the profile created by [`FakeSandbox::new`].
    pub fn locator(&self) -> ProfileLocator {
        ProfileLocator::new(FAKE_PROFILE_NAME).with_search_root(self.root())
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.config(), self.locator())
    }

    /// A supervisor whose profile name does not exist under the search root.
    pub fn supervisor_with_missing_profile(&self) -> Supervisor {
        Supervisor::new(
            self.config(),
            ProfileLocator::new("missing.profile").with_search_root(self.root()),
        )
    }
}
