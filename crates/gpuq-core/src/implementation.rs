//! The seam between the query layer and the machine it describes.
//!
//! [`GenuineImplementation`] asks the real drivers; [`MockImplementation`]
//! (in [`crate::mock`]) simulates a machine. Queries are written once
//! against the [`Implementation`] trait.
//!
//! [`MockImplementation`]: crate::mock::MockImplementation

use crate::config::{LoaderConfig, LocationHints};
use crate::error::Result;
use crate::facade::Facade;
use crate::provider::Provider;
use crate::record::DeviceProps;
use crate::visibility::{SystemViewGuard, VisibleDevices};

/// Source of device information.
pub trait Implementation {
    /// Whether the runtime of a single provider is installed and loadable.
    fn provider_check(&self, provider: Provider) -> bool;

    /// Devices this process is allowed to see.
    fn visible(&self) -> Result<VisibleDevices>;

    /// Number of devices on the machine, ignoring visibility.
    fn system_count(&self) -> Result<usize>;

    /// Device with machine-wide ordinal `ordinal`, ignoring visibility.
    fn system_get(&self, ordinal: usize) -> Result<DeviceProps>;
}

impl<T: Implementation + ?Sized> Implementation for &T {
    fn provider_check(&self, provider: Provider) -> bool {
        (**self).provider_check(provider)
    }

    fn visible(&self) -> Result<VisibleDevices> {
        (**self).visible()
    }

    fn system_count(&self) -> Result<usize> {
        (**self).system_count()
    }

    fn system_get(&self, ordinal: usize) -> Result<DeviceProps> {
        (**self).system_get(ordinal)
    }
}

/// Devices reported by the installed CUDA and HIP drivers.
#[derive(Debug, Default)]
pub struct GenuineImplementation {
    facade: Facade,
}

impl GenuineImplementation {
    /// Create an implementation over freshly constructed backends.
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            facade: Facade::new(config),
        }
    }

    /// The underlying facade.
    pub fn facade(&self) -> &Facade {
        &self.facade
    }

    /// Replace the location hints used by later initialization attempts.
    pub fn set_location_hints(&self, hints: &LocationHints) {
        self.facade.set_location_hints(hints);
    }
}

impl Implementation for GenuineImplementation {
    fn provider_check(&self, provider: Provider) -> bool {
        self.facade.check(provider)
    }

    fn visible(&self) -> Result<VisibleDevices> {
        VisibleDevices::from_env()
    }

    fn system_count(&self) -> Result<usize> {
        let _system = SystemViewGuard::enter();
        self.facade.count()
    }

    fn system_get(&self, ordinal: usize) -> Result<DeviceProps> {
        let _system = SystemViewGuard::enter();
        self.facade.get(ordinal)
    }
}
