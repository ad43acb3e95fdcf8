//! # gpuq
//!
//! Runtime discovery of CUDA and ROCm/HIP devices without any dependency on
//! a vendor SDK. Driver libraries are opened when first needed; a machine
//! without GPUs simply reports none.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gpuq::prelude::*;
//!
//! let gpus = GenuineImplementation::default();
//! println!("CUDA: {}, HIP: {}", gpus.has_cuda(), gpus.has_amd());
//! for device in gpus.query(Provider::any(), true, Required::No)? {
//!     println!("{device}");
//! }
//! # Ok::<(), GpuError>(())
//! ```
//!
//! ## Features
//!
//! - `serde`: serialization of device records
//! - `full`: every optional feature

pub use gpuq_core::*;

pub mod report;
