//! Loader configuration.

pub mod hints;

pub use hints::{LocationHints, LIBRARY_PATH_ENV, MAX_HINTS, MAX_HINT_LEN};

use crate::error::Result;

/// Settings used when opening vendor driver libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Directories searched after the bare library names.
    pub hints: LocationHints,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            hints: LocationHints::defaults().clone(),
        }
    }
}

impl LoaderConfig {
    /// Default hints plus the entries of `GPUQ_LIBRARY_PATH`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.hints.extend_from_env()?;
        Ok(config)
    }
}

/// Builder for creating a custom loader configuration.
pub struct LoaderConfigBuilder {
    defaults: bool,
    extra: Vec<std::path::PathBuf>,
}

impl LoaderConfigBuilder {
    /// Create a new builder starting from the platform defaults.
    pub fn new() -> Self {
        Self {
            defaults: true,
            extra: Vec::new(),
        }
    }

    /// Drop the platform default hints.
    pub fn no_default_hints(mut self) -> Self {
        self.defaults = false;
        self
    }

    /// Add one hint directory.
    pub fn hint<P: Into<std::path::PathBuf>>(mut self, dir: P) -> Self {
        self.extra.push(dir.into());
        self
    }

    /// Add several hint directories.
    pub fn hints<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<std::path::PathBuf>,
    {
        self.extra.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<LoaderConfig> {
        let mut hints = if self.defaults {
            LocationHints::defaults().clone()
        } else {
            LocationHints::empty()
        };
        for dir in self.extra {
            hints.push(dir)?;
        }
        Ok(LoaderConfig { hints })
    }
}

impl Default for LoaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
