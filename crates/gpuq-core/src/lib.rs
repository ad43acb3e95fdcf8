//! Runtime discovery of CUDA and ROCm/HIP devices.
//!
//! This crate finds out, without any build-time dependency on a vendor SDK,
//! which GPU driver stacks are installed, how many devices each one exposes,
//! and what those devices look like. Driver libraries are opened at runtime
//! and their functions resolved by name, so a machine without a GPU simply
//! reports zero devices.
//!
//! # Layers
//!
//! - [`diagnostics`]: bullet-list buffer of loader errors
//! - [`loader`]: opening driver libraries and resolving symbols
//! - [`backend`]: one lazily initialized backend per vendor
//! - [`record`]: the normalized [`DeviceProps`] record
//! - [`facade`]: both backends behind a single ordinal space
//! - [`implementation`] / [`mock`]: real or simulated machines
//! - [`query`]: filtered, visibility-aware queries
//!
//! # Example
//!
//! ```no_run
//! use gpuq_core::prelude::*;
//!
//! let gpus = GenuineImplementation::default();
//! for device in gpus.query(Provider::any(), true, Required::No)? {
//!     println!("{} {} ({} bytes)", device.ord(), device.name, device.total_memory);
//! }
//! # Ok::<(), GpuError>(())
//! ```

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod facade;
pub mod implementation;
pub mod loader;
pub mod mock;
pub mod provider;
pub mod query;
pub mod record;
pub mod visibility;

pub use error::{GpuError, LoadError, Result, Status};
pub use provider::Provider;
pub use record::DeviceProps;

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use gpuq_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{Backend, BackendState, CudaDriver, Driver, HipDriver};
    pub use crate::config::{LoaderConfig, LoaderConfigBuilder, LocationHints};
    pub use crate::diagnostics::{Diagnostics, RecordMode};
    pub use crate::error::{GpuError, LoadError, Result, Status};
    pub use crate::facade::Facade;
    pub use crate::implementation::{GenuineImplementation, Implementation};
    pub use crate::mock::MockImplementation;
    pub use crate::provider::Provider;
    pub use crate::query::{Properties, Query, Required};
    pub use crate::record::{DeviceName, DeviceProps, FixedCStr};
    pub use crate::visibility::VisibleDevices;
}
