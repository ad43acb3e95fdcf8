//! Error types for driver loading and device queries.
//!
//! Loading failures ([`LoadError`]) stay inside a backend until a query needs
//! the driver; they then surface as [`GpuError::Unavailable`] together with
//! the diagnostics collected during the attempt. Every error maps onto a flat
//! [`Status`] code for foreign callers.

use std::fmt;

use thiserror::Error;

use crate::provider::Provider;

/// Errors raised while opening a vendor driver library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// None of the candidate library names or paths could be opened.
    #[error("no driver library found ({tried} candidates tried)")]
    LibraryNotFound {
        /// Number of candidates attempted
        tried: usize,
    },

    /// The library was opened but lacks required entry points.
    #[error("driver library is missing required symbols: {}", .symbols.join(", "))]
    MissingSymbols {
        /// Names of the unresolved symbols
        symbols: Vec<String>,
    },
}

/// Errors that can occur while querying GPU devices.
#[derive(Debug, Clone, Error)]
pub enum GpuError {
    /// The backend could not be initialized.
    ///
    /// The driver library is absent or unusable. `diagnostics` holds the
    /// loader messages gathered during the failed attempt.
    #[error("{provider} runtime is not available: {source}")]
    Unavailable {
        /// Backend that failed to initialize
        provider: Provider,
        /// Why loading failed
        source: LoadError,
        /// Accumulated loader diagnostics, if any
        diagnostics: Option<String>,
    },

    /// A vendor call returned an error status.
    #[error("{provider} call {operation} failed with status {code}")]
    QueryFailed {
        /// Backend the call was made on
        provider: Provider,
        /// Name of the vendor entry point
        operation: &'static str,
        /// Native status code
        code: i32,
    },

    /// The driver is present but reports no devices.
    #[error("{provider} driver reports no devices")]
    NoDevice {
        /// Backend that reported no device
        provider: Provider,
    },

    /// Device index outside `[0, count)`.
    #[error("device index {index} is out of range (device count: {count})")]
    InvalidIndex {
        /// Requested index
        index: i64,
        /// Number of devices available
        count: usize,
    },

    /// Invalid configuration (location hints, visibility variables).
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem
        reason: String,
    },

    /// A provider marked as required has no devices.
    #[error("required provider {provider} has no devices")]
    ProviderRequired {
        /// Provider without devices
        provider: Provider,
    },
}

/// Flat status codes returned by the device query entry points.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Success.
    Ok = 0,
    /// Backend not initialized or driver library missing.
    Unavailable = 1,
    /// A vendor call failed.
    QueryFailed = 2,
    /// Device index out of range.
    InvalidIndex = 3,
    /// Rejected configuration.
    InvalidConfig = 4,
    /// A required provider has no devices.
    ProviderRequired = 5,
}

impl Status {
    /// Numeric value of the status.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::Unavailable => "unavailable",
            Self::QueryFailed => "query failed",
            Self::InvalidIndex => "invalid index",
            Self::InvalidConfig => "invalid configuration",
            Self::ProviderRequired => "provider required",
        };
        f.write_str(text)
    }
}

impl GpuError {
    /// Create an Unavailable error from a load failure.
    pub fn unavailable(provider: Provider, source: LoadError, diagnostics: Option<String>) -> Self {
        Self::Unavailable {
            provider,
            source,
            diagnostics,
        }
    }

    /// Create a QueryFailed error for a vendor entry point.
    pub fn query_failed(provider: Provider, operation: &'static str, code: i32) -> Self {
        Self::QueryFailed {
            provider,
            operation,
            code,
        }
    }

    /// Create an InvalidIndex error.
    pub fn invalid_index(index: i64, count: usize) -> Self {
        Self::InvalidIndex { index, count }
    }

    /// Create an InvalidConfig error with a custom reason.
    pub fn invalid_config<S: Into<String>>(reason: S) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Flat status code for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::Unavailable { .. } => Status::Unavailable,
            Self::QueryFailed { .. } | Self::NoDevice { .. } => Status::QueryFailed,
            Self::InvalidIndex { .. } => Status::InvalidIndex,
            Self::InvalidConfig { .. } => Status::InvalidConfig,
            Self::ProviderRequired { .. } => Status::ProviderRequired,
        }
    }

    /// Whether the error means "this backend contributes no devices".
    ///
    /// Used by the merged views, which treat a missing runtime or an empty
    /// driver as zero devices rather than a failure.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::NoDevice { .. })
    }
}

/// Result type for device queries.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = GpuError::unavailable(
            Provider::CUDA,
            LoadError::LibraryNotFound { tried: 2 },
            None,
        );
        assert_eq!(err.status(), Status::Unavailable);
        assert_eq!(err.status().code(), 1);

        let err = GpuError::query_failed(Provider::HIP, "hipGetDeviceCount", 101);
        assert_eq!(err.status(), Status::QueryFailed);
        assert_eq!(
            GpuError::NoDevice {
                provider: Provider::CUDA
            }
            .status(),
            Status::QueryFailed
        );
        assert_eq!(GpuError::invalid_index(-1, 0).status().code(), 3);
        assert_eq!(Status::Ok.code(), 0);
    }

    #[test]
    fn test_error_display() {
        let err = GpuError::unavailable(
            Provider::HIP,
            LoadError::MissingSymbols {
                symbols: vec!["hipInit".into(), "hipDeviceGet".into()],
            },
            Some(" * hipInit: undefined symbol".into()),
        );
        let text = err.to_string();
        assert!(text.contains("HIP runtime is not available"));
        assert!(text.contains("hipInit, hipDeviceGet"));

        let err = GpuError::invalid_index(4, 2);
        assert_eq!(
            err.to_string(),
            "device index 4 is out of range (device count: 2)"
        );
    }

    #[test]
    fn test_absent() {
        assert!(GpuError::NoDevice {
            provider: Provider::HIP
        }
        .is_absent());
        assert!(!GpuError::query_failed(Provider::CUDA, "cuInit", 999).is_absent());
        assert!(!GpuError::invalid_config("bad").is_absent());
    }
}
