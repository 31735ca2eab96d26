//! Locating the sandbox profile file.
//!
//! Lookup order:
//!
//! 1. `$SANDBOX_PROFILE_DIR/<name>` when the variable is set and non-empty
//!    (taken as given, not checked for existence).
//! 2. The first existing file among the candidate directories below the
//!    search root (the working directory at startup):
//!    `sandbox_profiles/<name>`, then `jailstream/sandbox_profiles/<name>`.
//! 3. The bare name. The sandbox tool will reject it, which surfaces to the
//!    client as an `ERR:` line rather than a crashed service.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Environment variable that overrides the profile directory.
pub const PROFILE_DIR_ENV: &str = "SANDBOX_PROFILE_DIR";
/// Profile used for `/run-system`.
pub const DEFAULT_PROFILE_NAME: &str = "system.profile";

/// Directories searched below the search root, in order.
pub fn default_candidate_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("sandbox_profiles"),
        Path::new("jailstream").join("sandbox_profiles"),
    ]
}

/// Outcome of a profile lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileResolution {
    /// Joined onto the override directory.
    Override(PathBuf),
    /// Found in one of the candidate directories.
    Found(PathBuf),
    /// Nothing matched; the bare name is passed through.
    Unresolved(String),
}

impl ProfileResolution {
    /// Value handed to the sandbox tool.
    pub fn as_os_str(&self) -> &OsStr {
        match self {
            ProfileResolution::Override(path) | ProfileResolution::Found(path) => path.as_os_str(),
            ProfileResolution::Unresolved(name) => OsStr::new(name),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, ProfileResolution::Unresolved(_))
    }
}

/// Explicit profile lookup configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLocator {
    name: String,
    override_dir: Option<PathBuf>,
    search_root: Option<PathBuf>,
    candidate_dirs: Vec<PathBuf>,
}

impl ProfileLocator {
    /// A locator with no override and no search root; it resolves to the bare name
    /// until one of them is configured.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            override_dir: None,
            search_root: None,
            candidate_dirs: default_candidate_dirs(),
        }
    }

    /// Reads `SANDBOX_PROFILE_DIR` and the current directory once.
    pub fn from_env(name: impl Into<String>) -> Self {
        let override_dir = std::env::var_os(PROFILE_DIR_ENV)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        let search_root = match std::env::current_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                debug!("Cannot determine working directory for profile lookup: {}", e);
                None
            }
        };

        Self {
            override_dir,
            search_root,
            ..Self::new(name)
        }
    }

    pub fn with_override_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.override_dir = Some(dir.into());
        self
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = Some(root.into());
        self
    }

    pub fn with_candidate_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.candidate_dirs = dirs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    /// Full candidate paths in lookup order (excluding the override).
    pub fn candidates(&self) -> Vec<PathBuf> {
        let Some(root) = &self.search_root else {
            return Vec::new();
        };
        self.candidate_dirs
            .iter()
            .map(|dir| root.join(dir).join(&self.name))
            .collect()
    }

    pub fn resolve(&self) -> ProfileResolution {
        if let Some(dir) = &self.override_dir {
            return ProfileResolution::Override(dir.join(&self.name));
        }

        if let Some(found) = self.candidates().into_iter().find(|path| path.is_file()) {
            debug!(profile = %found.display(), "Resolved sandbox profile");
            return ProfileResolution::Found(found);
        }

        error!(
            profile = %self.name,
            candidates = ?self.candidates(),
            "Could not find sandbox profile; passing bare name to the sandbox tool"
        );
        ProfileResolution::Unresolved(self.name.clone())
    }
}
