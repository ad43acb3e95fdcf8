//! Extra directories searched for vendor driver libraries.
//!
//! Hints are tried after the bare library names, so the operating system's
//! own search path always wins. The list is bounded: at most
//! [`MAX_HINTS`] entries of at most [`MAX_HINT_LEN`] bytes each.

use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::error::{GpuError, Result};

/// Maximum number of location hints.
pub const MAX_HINTS: usize = 16;

/// Maximum length of one hint, in bytes of its OS representation.
pub const MAX_HINT_LEN: usize = 127;

/// Environment variable holding additional hints, in platform path-list syntax.
pub const LIBRARY_PATH_ENV: &str = "GPUQ_LIBRARY_PATH";

#[cfg(unix)]
const DEFAULT_HINTS: &[&str] = &["/usr/lib/wsl/lib", "/usr/local/cuda/lib64", "/opt/rocm/lib"];

#[cfg(not(unix))]
const DEFAULT_HINTS: &[&str] = &[];

static DEFAULTS: Lazy<LocationHints> = Lazy::new(|| LocationHints {
    dirs: DEFAULT_HINTS.iter().map(PathBuf::from).collect(),
});

/// Validated list of library directories.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationHints {
    dirs: Vec<PathBuf>,
}

impl LocationHints {
    /// Validate and wrap a list of directories.
    pub fn new<I, P>(dirs: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut hints = Self::empty();
        for dir in dirs {
            hints.push(dir)?;
        }
        Ok(hints)
    }

    /// No hints at all.
    pub const fn empty() -> Self {
        Self { dirs: Vec::new() }
    }

    /// Platform default hints.
    pub fn defaults() -> &'static Self {
        &DEFAULTS
    }

    /// Add one directory.
    pub fn push<P: Into<PathBuf>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.into();
        if self.dirs.len() >= MAX_HINTS {
            return Err(GpuError::invalid_config(format!(
                "too many location hints (at most {MAX_HINTS} are supported)"
            )));
        }
        let len = dir.as_os_str().len();
        if len > MAX_HINT_LEN {
            return Err(GpuError::invalid_config(format!(
                "location hint is {len} bytes long, at most {MAX_HINT_LEN} are supported: {}",
                dir.display()
            )));
        }
        self.dirs.push(dir);
        Ok(())
    }

    /// Append the entries of [`LIBRARY_PATH_ENV`], if set.
    pub fn extend_from_env(&mut self) -> Result<()> {
        if let Some(value) = std::env::var_os(LIBRARY_PATH_ENV) {
            for dir in std::env::split_paths(&value) {
                if !dir.as_os_str().is_empty() {
                    self.push(dir)?;
                }
            }
        }
        Ok(())
    }

    /// Configured directories.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Number of hints.
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Whether no hint is configured.
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Candidate paths for `names`: the bare names first, then every hint
    /// directory joined with every name.
    pub fn candidates(&self, names: &[&str]) -> Vec<PathBuf> {
        let bare = names.iter().map(PathBuf::from);
        let hinted = self
            .dirs
            .iter()
            .flat_map(|dir| names.iter().map(move |name| dir.join(name)));
        bare.chain(hinted).collect()
    }
}
