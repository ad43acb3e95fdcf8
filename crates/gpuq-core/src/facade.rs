//! Entry points over both vendor backends.
//!
//! A [`Facade`] owns one [`Backend`] per vendor. Each backend is reachable
//! through its own `check` / count / props / `clean` functions, and the two
//! are combined into a single ordinal space: CUDA devices first, then HIP
//! devices, so every device has a distinct ordinal.

use crate::backend::{Backend, CudaDriver, Driver, HipDriver};
use crate::config::{LoaderConfig, LocationHints};
use crate::error::{GpuError, Result};
use crate::provider::Provider;
use crate::record::DeviceProps;

/// Both vendor backends behind one object.
pub struct Facade<C: Driver = CudaDriver, H: Driver = HipDriver> {
    cuda: Backend<C>,
    hip: Backend<H>,
}

impl<C: Driver, H: Driver> std::fmt::Debug for Facade<C, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facade")
            .field("cuda", &self.cuda)
            .field("hip", &self.hip)
            .finish()
    }
}

impl Facade {
    /// Create a facade over the real drivers. Nothing is loaded yet.
    pub fn new(config: &LoaderConfig) -> Self {
        Self::with_backends(
            Backend::new(config.hints.clone()),
            Backend::new(config.hints.clone()),
        )
    }

    /// Use new location hints for subsequent initialization attempts.
    ///
    /// Backends that are already ready keep their loaded driver until
    /// cleaned.
    pub fn set_location_hints(&self, hints: &LocationHints) {
        self.cuda.set_locator(hints.clone());
        self.hip.set_locator(hints.clone());
    }
}

impl Default for Facade {
    fn default() -> Self {
        Self::new(&LoaderConfig::default())
    }
}

fn count_or_zero(result: Result<usize>) -> Result<usize> {
    match result {
        Err(err) if err.is_absent() => Ok(0),
        other => other,
    }
}

impl<C: Driver, H: Driver> Facade<C, H> {
    /// Combine two existing backends.
    pub fn with_backends(cuda: Backend<C>, hip: Backend<H>) -> Self {
        Self { cuda, hip }
    }

    /// The CUDA backend.
    pub fn cuda(&self) -> &Backend<C> {
        &self.cuda
    }

    /// The HIP backend.
    pub fn hip(&self) -> &Backend<H> {
        &self.hip
    }

    /// Whether the CUDA driver is usable.
    pub fn check_cuda(&self) -> bool {
        self.cuda.check()
    }

    /// Number of CUDA devices.
    pub fn cuda_device_count(&self) -> Result<usize> {
        self.cuda.device_count()
    }

    /// Properties of CUDA device `index`.
    pub fn cuda_device_props(&self, index: i64) -> Result<DeviceProps> {
        self.cuda.device_props(index)
    }

    /// Release the CUDA driver.
    pub fn clean_cuda(&self) {
        self.cuda.clean();
    }

    /// Whether the HIP runtime is usable.
    pub fn check_amd(&self) -> bool {
        self.hip.check()
    }

    /// Number of HIP devices.
    pub fn amd_device_count(&self) -> Result<usize> {
        self.hip.device_count()
    }

    /// Properties of HIP device `index`.
    ///
    /// The ordinal is offset by the current CUDA device count, as in
    /// [`get`](Self::get).
    pub fn amd_device_props(&self, index: i64) -> Result<DeviceProps> {
        self.hip.set_ordinal_base(count_or_zero(self.cuda.device_count())?);
        self.hip.device_props(index)
    }

    /// Release the HIP runtime.
    pub fn clean_amd(&self) {
        self.hip.clean();
    }

    /// Whether the runtime of a single `provider` is usable.
    pub fn check(&self, provider: Provider) -> bool {
        if provider == Provider::CUDA {
            self.check_cuda()
        } else if provider == Provider::HIP {
            self.check_amd()
        } else {
            false
        }
    }

    /// Release both backends.
    pub fn clean(&self) {
        self.clean_cuda();
        self.clean_amd();
    }

    /// Loader diagnostics of a single provider's backend.
    pub fn diagnostics(&self, provider: Provider) -> Option<String> {
        if provider == Provider::CUDA {
            self.cuda.diagnostics()
        } else if provider == Provider::HIP {
            self.hip.diagnostics()
        } else {
            None
        }
    }

    /// Total number of devices across both vendors.
    ///
    /// A missing runtime, or one without devices, contributes zero.
    pub fn count(&self) -> Result<usize> {
        let cuda = count_or_zero(self.cuda.device_count())?;
        self.hip.set_ordinal_base(cuda);
        let hip = count_or_zero(self.hip.device_count())?;
        Ok(cuda + hip)
    }

    /// Properties of the device with merged ordinal `ordinal`.
    pub fn get(&self, ordinal: usize) -> Result<DeviceProps> {
        let cuda = count_or_zero(self.cuda.device_count())?;
        let signed = |value: usize| i64::try_from(value).unwrap_or(i64::MAX);
        if ordinal < cuda {
            return self.cuda.device_props(signed(ordinal));
        }

        self.hip.set_ordinal_base(cuda);
        let hip = count_or_zero(self.hip.device_count())?;
        if ordinal - cuda < hip {
            return self.hip.device_props(signed(ordinal - cuda));
        }

        Err(GpuError::invalid_index(signed(ordinal), cuda + hip))
    }
}
