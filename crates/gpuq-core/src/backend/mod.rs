//! Lazily initialized vendor backends.
//!
//! A [`Backend`] owns everything one vendor needs: the locator used to open
//! its driver, the opened driver once initialization succeeded, the cached
//! device count and the diagnostics of the last attempt. All of it sits behind
//! a single mutex, so a backend can be shared between threads and every
//! operation observes a consistent state.
//!
//! ```text
//! uninitialized --init ok--> ready --clean--> uninitialized
//!       |                                           ^
//!       +--init failed--> failed --clean------------+
//!                           |
//!                           +--query--> init attempt
//! ```
//!
//! While a backend is not ready, every operation retries initialization.
//! The vendor differences live behind the [`Driver`] trait.

pub mod cuda;
pub mod hip;

use std::ffi::c_int;
use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostics;
use crate::error::{GpuError, LoadError, Result};
use crate::provider::Provider;
use crate::record::DeviceProps;

pub use cuda::CudaDriver;
pub use hip::HipDriver;

/// Native status code returned by a vendor call.
pub type NativeStatus = c_int;

/// Failed vendor call: the entry point name and its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallError {
    /// Vendor entry point that failed.
    pub operation: &'static str,
    /// Status it returned.
    pub code: NativeStatus,
}

impl CallError {
    /// Create a call error.
    pub const fn new(operation: &'static str, code: NativeStatus) -> Self {
        Self { operation, code }
    }
}

/// Turn a vendor status into a `Result`, treating zero as success.
pub fn check_status(
    operation: &'static str,
    code: NativeStatus,
) -> std::result::Result<(), CallError> {
    if code == 0 {
        Ok(())
    } else {
        Err(CallError::new(operation, code))
    }
}

/// Convert a device count written by a successful vendor call.
///
/// A negative count is reported as `invalid`, the vendor's "invalid value"
/// status, so it surfaces as a failed query instead of an empty machine.
pub fn native_count(
    operation: &'static str,
    count: c_int,
    invalid: NativeStatus,
) -> std::result::Result<usize, CallError> {
    usize::try_from(count).map_err(|_| {
        warn!(operation, count, "driver reported a negative device count");
        CallError::new(operation, invalid)
    })
}

/// Native device description read from a vendor driver.
pub trait NativeDescriptor {
    /// Map the native fields onto a normalized record.
    fn normalize(&self, ordinal: usize, index: usize) -> DeviceProps;
}

/// One vendor driver.
///
/// Implementations resolve their entry points in [`open`](Driver::open) and
/// perform the native calls; the surrounding [`Backend`] provides caching,
/// locking, index validation and error mapping.
pub trait Driver: Sized + Send {
    /// Where the driver is opened from.
    type Locator: Send;

    /// Native device description.
    type Descriptor: NativeDescriptor;

    /// Native status meaning "driver present, no device".
    const NO_DEVICE: NativeStatus;

    /// Provider served by drivers opened from `locator`.
    fn provider(locator: &Self::Locator) -> Provider;

    /// Open the driver, appending loader failures to `diagnostics`.
    fn open(
        locator: &Self::Locator,
        diagnostics: &mut Diagnostics,
    ) -> std::result::Result<Self, LoadError>;

    /// Number of devices reported by the driver.
    fn device_count(&mut self) -> std::result::Result<usize, CallError>;

    /// Read the native description of device `index`.
    ///
    /// `index` is always below the last count returned by
    /// [`device_count`](Driver::device_count).
    fn describe(&mut self, index: usize) -> std::result::Result<Self::Descriptor, CallError>;
}

/// Observable initialization state of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendState {
    /// Never initialized, or cleaned since.
    Uninitialized,
    /// Driver opened and all entry points resolved.
    Ready,
    /// The last initialization attempt failed.
    Failed,
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Ready => f.write_str("ready"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

enum State<D> {
    Uninitialized,
    Ready { driver: D, count: Option<usize> },
    Failed(LoadError),
}

struct Inner<D: Driver> {
    state: State<D>,
    locator: D::Locator,
    diagnostics: Diagnostics,
    ordinal_base: usize,
}

impl<D: Driver> Inner<D> {
    /// Initialize unless ready, returning the driver and its cached count.
    fn ensure_ready(&mut self, provider: Provider) -> Result<(&mut D, &mut Option<usize>)> {
        if !matches!(self.state, State::Ready { .. }) {
            self.diagnostics.reset();
            match D::open(&self.locator, &mut self.diagnostics) {
                Ok(driver) => {
                    info!(%provider, "GPU backend ready");
                    self.state = State::Ready {
                        driver,
                        count: None,
                    };
                }
                Err(err) => {
                    warn!(%provider, error = %err, "GPU backend unavailable");
                    self.state = State::Failed(err);
                }
            }
        }

        match &mut self.state {
            State::Ready { driver, count } => Ok((driver, count)),
            State::Failed(err) => Err(GpuError::unavailable(
                provider,
                err.clone(),
                self.diagnostics.text().map(str::to_owned),
            )),
            State::Uninitialized => Err(GpuError::unavailable(
                provider,
                LoadError::LibraryNotFound { tried: 0 },
                None,
            )),
        }
    }
}

fn call_error(provider: Provider, no_device: NativeStatus, err: CallError) -> GpuError {
    if err.code == no_device {
        GpuError::NoDevice { provider }
    } else {
        GpuError::query_failed(provider, err.operation, err.code)
    }
}

/// Thread-safe, lazily initialized backend for one vendor.
pub struct Backend<D: Driver> {
    provider: Provider,
    inner: Mutex<Inner<D>>,
}

impl<D: Driver> fmt::Debug for Backend<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("provider", &self.provider)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Backend<D> {
    /// Create an uninitialized backend. Nothing is loaded until first use.
    pub fn new(locator: D::Locator) -> Self {
        Self {
            provider: D::provider(&locator),
            inner: Mutex::new(Inner {
                state: State::Uninitialized,
                locator,
                diagnostics: Diagnostics::new(),
                ordinal_base: 0,
            }),
        }
    }

    /// Provider served by this backend.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Initialize if needed and report whether the backend is ready.
    pub fn check(&self) -> bool {
        self.inner.lock().ensure_ready(self.provider).is_ok()
    }

    /// Number of devices.
    ///
    /// The count is cached until the next [`clean`](Self::clean).
    pub fn device_count(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let (driver, cached) = inner.ensure_ready(self.provider)?;
        let count = driver
            .device_count()
            .map_err(|err| call_error(self.provider, D::NO_DEVICE, err))?;
        *cached = Some(count);
        Ok(count)
    }

    /// Properties of device `index`.
    ///
    /// `index` must lie in `[0, count)`, where `count` is the last known
    /// device count (queried now if none is cached).
    pub fn device_props(&self, index: i64) -> Result<DeviceProps> {
        let mut inner = self.inner.lock();
        let base = inner.ordinal_base;
        let (driver, cached) = inner.ensure_ready(self.provider)?;

        let count = match *cached {
            Some(count) => count,
            None => {
                let count = driver
                    .device_count()
                    .map_err(|err| call_error(self.provider, D::NO_DEVICE, err))?;
                *cached = Some(count);
                count
            }
        };

        let index = usize::try_from(index)
            .ok()
            .filter(|&i| i < count)
            .ok_or_else(|| GpuError::invalid_index(index, count))?;

        let descriptor = driver
            .describe(index)
            .map_err(|err| call_error(self.provider, D::NO_DEVICE, err))?;
        Ok(descriptor.normalize(base + index, index))
    }

    /// Release the driver and return to the uninitialized state.
    ///
    /// Safe to call in any state, any number of times.
    pub fn clean(&self) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, State::Uninitialized) {
            debug!(provider = %self.provider, "releasing GPU backend");
        }
        inner.state = State::Uninitialized;
        inner.diagnostics.reset();
    }

    /// Current initialization state, without triggering initialization.
    pub fn state(&self) -> BackendState {
        match self.inner.lock().state {
            State::Uninitialized => BackendState::Uninitialized,
            State::Ready { .. } => BackendState::Ready,
            State::Failed(_) => BackendState::Failed,
        }
    }

    /// Loader diagnostics from the most recent initialization attempt.
    pub fn diagnostics(&self) -> Option<String> {
        self.inner.lock().diagnostics.text().map(str::to_owned)
    }

    /// Replace the locator. Takes effect at the next initialization attempt.
    pub fn set_locator(&self, locator: D::Locator) {
        self.inner.lock().locator = locator;
    }

    /// Offset added to device indices to form ordinals.
    pub fn set_ordinal_base(&self, base: usize) {
        self.inner.lock().ordinal_base = base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockDriverState};
    use pretty_assertions::assert_eq;

    fn backend(state: MockDriverState) -> (Backend<MockDriver>, crate::mock::MockDriverHandle) {
        let handle = state.into_handle();
        (Backend::new(handle.clone()), handle)
    }

    #[test]
    fn test_native_count() {
        assert_eq!(native_count("cuDeviceGetCount", 4, 1), Ok(4));
        assert_eq!(native_count("cuDeviceGetCount", 0, 1), Ok(0));
        assert_eq!(
            native_count("hipGetDeviceCount", -2, 1),
            Err(CallError::new("hipGetDeviceCount", 1))
        );

        let negative = CallError::new("hipGetDeviceCount", 1);
        let err = call_error(Provider::HIP, MockDriver::NO_DEVICE, negative);
        assert_eq!(err.status(), crate::error::Status::QueryFailed);
    }

    #[test]
    fn test_lazy_initialization() {
        let (backend, handle) = backend(MockDriverState::new(Provider::CUDA).devices(2));
        assert_eq!(backend.state(), BackendState::Uninitialized);
        assert_eq!(handle.load_attempts(), 0);

        assert!(backend.check());
        assert_eq!(backend.state(), BackendState::Ready);
        assert!(backend.check());
        assert_eq!(handle.load_attempts(), 1);
    }

    #[test]
    fn test_missing_library_is_unavailable() {
        let (backend, handle) = backend(MockDriverState::new(Provider::HIP).absent());
        assert!(!backend.check());
        assert_eq!(backend.state(), BackendState::Failed);

        let err = backend.device_count().unwrap_err();
        assert!(matches!(err, GpuError::Unavailable { provider, .. } if provider == Provider::HIP));
        let diagnostics = backend.diagnostics().unwrap();
        assert!(diagnostics.starts_with(" * "));
        // Retried on each call while failed.
        assert_eq!(handle.load_attempts(), 2);
    }

    #[test]
    fn test_failure_is_not_frozen() {
        let (backend, handle) = backend(MockDriverState::new(Provider::CUDA).absent().devices(1));
        assert!(!backend.check());

        handle.set_present(true);
        assert!(backend.check());
        assert_eq!(backend.device_count().unwrap(), 1);
        assert_eq!(backend.diagnostics(), None);
    }

    #[test]
    fn test_missing_symbol_reports_each() {
        let (backend, _) = backend(
            MockDriverState::new(Provider::CUDA).missing_symbols(["cuInit", "cuDeviceGet"]),
        );
        let err = backend.device_count().unwrap_err();
        match err {
            GpuError::Unavailable {
                source: LoadError::MissingSymbols { symbols },
                diagnostics: Some(diagnostics),
                ..
            } => {
                assert_eq!(symbols, vec!["cuInit".to_string(), "cuDeviceGet".to_string()]);
                assert_eq!(diagnostics.lines().count(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_count_and_props() {
        let (backend, _) = backend(MockDriverState::new(Provider::HIP).devices(3));
        assert_eq!(backend.device_count().unwrap(), 3);

        let props = backend.device_props(2).unwrap();
        assert_eq!(props.index, 2);
        assert_eq!(props.ordinal, 2);
        assert_eq!(props.provider, Provider::HIP);
        assert_eq!(props.provider_name.as_str(), "HIP");
    }

    #[test]
    fn test_props_without_prior_count() {
        let (backend, _) = backend(MockDriverState::new(Provider::CUDA).devices(1));
        assert!(backend.device_props(0).is_ok());
    }

    #[test]
    fn test_invalid_index() {
        let (backend, handle) = backend(MockDriverState::new(Provider::CUDA).devices(2));
        for index in [-1, 2, 100] {
            let err = backend.device_props(index).unwrap_err();
            assert_eq!(err.status(), crate::error::Status::InvalidIndex);
        }
        assert_eq!(handle.describe_calls(), 0);
    }

    #[test]
    fn test_query_failures() {
        let (backend, handle) = backend(MockDriverState::new(Provider::CUDA).devices(1));
        handle.fail_count(Some(999));
        let err = backend.device_count().unwrap_err();
        assert!(matches!(err, GpuError::QueryFailed { code: 999, .. }));

        handle.fail_count(Some(MockDriver::NO_DEVICE));
        let err = backend.device_count().unwrap_err();
        assert!(matches!(err, GpuError::NoDevice { .. }));
        // A failed query does not make the backend unavailable.
        assert!(backend.check());

        handle.fail_count(None);
        handle.fail_describe(Some(3));
        let err = backend.device_props(0).unwrap_err();
        assert!(matches!(err, GpuError::QueryFailed { code: 3, .. }));
    }

    #[test]
    fn test_clean_is_idempotent() {
        let (backend, handle) = backend(MockDriverState::new(Provider::CUDA).devices(1));
        backend.clean();
        backend.clean();
        assert_eq!(backend.state(), BackendState::Uninitialized);

        assert!(backend.check());
        backend.clean();
        backend.clean();
        assert_eq!(backend.state(), BackendState::Uninitialized);
        assert_eq!(handle.open_drivers(), 0);

        assert!(backend.check());
        assert_eq!(handle.load_attempts(), 2);
    }

    #[test]
    fn test_clean_after_failure() {
        let (backend, _) = backend(MockDriverState::new(Provider::HIP).absent());
        assert!(!backend.check());
        backend.clean();
        assert_eq!(backend.state(), BackendState::Uninitialized);
        assert_eq!(backend.diagnostics(), None);
        assert!(!backend.check());
    }

    #[test]
    fn test_clean_drops_cached_count() {
        let (backend, handle) = backend(MockDriverState::new(Provider::CUDA).devices(1));
        assert_eq!(backend.device_count().unwrap(), 1);
        backend.clean();
        handle.set_devices(3);
        assert!(backend.device_props(2).is_ok());
    }

    #[test]
    fn test_ordinal_base() {
        let (backend, _) = backend(MockDriverState::new(Provider::HIP).devices(2));
        backend.set_ordinal_base(5);
        let props = backend.device_props(1).unwrap();
        assert_eq!(props.ordinal, 6);
        assert_eq!(props.index, 1);
    }

    #[test]
    fn test_backend_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Backend<MockDriver>>();
        assert_send_sync::<Backend<CudaDriver>>();
        assert_send_sync::<Backend<HipDriver>>();
    }
}
