//! AMD ROCm backend over the HIP runtime (`libamdhip64`).

use std::ffi::{c_char, c_int, c_uint};

use tracing::{debug, info};

use super::{check_status, native_count, CallError, Driver, NativeDescriptor, NativeStatus};
use crate::config::LocationHints;
use crate::diagnostics::Diagnostics;
use crate::error::LoadError;
use crate::loader::DriverLibrary;
use crate::provider::Provider;
use crate::record::{DeviceName, DeviceProps};

type HipDevice = c_int;

type FnHipInit = unsafe extern "C" fn(flags: c_uint) -> NativeStatus;
type FnHipGetDeviceCount = unsafe extern "C" fn(count: *mut c_int) -> NativeStatus;
type FnHipDeviceGet = unsafe extern "C" fn(device: *mut HipDevice, ordinal: c_int) -> NativeStatus;
type FnHipDeviceGetName =
    unsafe extern "C" fn(name: *mut c_char, len: c_int, device: HipDevice) -> NativeStatus;
type FnHipDeviceTotalMem =
    unsafe extern "C" fn(bytes: *mut usize, device: HipDevice) -> NativeStatus;
type FnHipDeviceGetAttribute =
    unsafe extern "C" fn(value: *mut c_int, attr: c_int, device_id: c_int) -> NativeStatus;

/// `hipErrorInvalidValue`.
pub const HIP_ERROR_INVALID_VALUE: NativeStatus = 1;

/// `hipErrorNoDevice`.
pub const HIP_ERROR_NO_DEVICE: NativeStatus = 100;

/// `hipErrorInvalidDevice`.
pub const HIP_ERROR_INVALID_DEVICE: NativeStatus = 101;

/// Shared object names tried before the location hints.
#[cfg(windows)]
pub const LIBRARY_NAMES: &[&str] = &["amdhip64_6.dll", "amdhip64.dll"];
/// Shared object names tried before the location hints.
#[cfg(not(windows))]
pub const LIBRARY_NAMES: &[&str] = &["libamdhip64.so.6", "libamdhip64.so.5", "libamdhip64.so"];

/// Entry points that must be exported by the runtime.
pub const REQUIRED_SYMBOLS: &[&str] = &[
    "hipInit",
    "hipGetDeviceCount",
    "hipDeviceGet",
    "hipDeviceGetName",
    "hipDeviceTotalMem",
    "hipDeviceGetAttribute",
];

// hipDeviceAttribute_t, ROCm 5/6 numbering.
mod attr {
    pub const ASYNC_ENGINE_COUNT: i32 = 2;
    pub const CONCURRENT_KERNELS: i32 = 8;
    pub const COOPERATIVE_LAUNCH: i32 = 10;
    pub const L2_CACHE_SIZE: i32 = 19;
    pub const COMPUTE_CAPABILITY_MAJOR: i32 = 23;
    pub const MAX_BLOCKS_PER_MULTIPROCESSOR: i32 = 25;
    pub const MAX_THREADS_PER_BLOCK: i32 = 56;
    pub const MAX_THREADS_PER_MULTIPROCESSOR: i32 = 57;
    pub const COMPUTE_CAPABILITY_MINOR: i32 = 61;
    pub const MULTIPROCESSOR_COUNT: i32 = 63;
    pub const MAX_REGISTERS_PER_BLOCK: i32 = 71;
    pub const MAX_REGISTERS_PER_MULTIPROCESSOR: i32 = 72;
    pub const SHARED_MEM_PER_BLOCK: i32 = 74;
    pub const SHARED_MEM_PER_MULTIPROCESSOR: i32 = 76;
    pub const WARP_SIZE: i32 = 87;
}

/// Raw HIP device description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HipDeviceDescriptor {
    /// Bytes written by `hipDeviceGetName`, up to the terminator.
    pub name: Vec<u8>,
    /// `hipDeviceTotalMem`.
    pub total_global_mem: usize,
    /// Compute capability major (derived from the GFX target by HIP).
    pub major: i32,
    /// Compute capability minor.
    pub minor: i32,
    /// Compute unit count.
    pub multi_processor_count: i32,
    /// Max threads per compute unit.
    pub max_threads_per_multi_processor: i32,
    /// LDS per compute unit.
    pub max_shared_memory_per_multi_processor: i32,
    /// Registers per compute unit.
    pub regs_per_multiprocessor: i32,
    /// Max blocks per compute unit.
    pub max_blocks_per_multi_processor: i32,
    /// Max threads per block.
    pub max_threads_per_block: i32,
    /// LDS per block.
    pub shared_mem_per_block: i32,
    /// Registers per block.
    pub regs_per_block: i32,
    /// Wavefront size.
    pub warp_size: i32,
    /// L2 cache size.
    pub l2_cache_size: i32,
    /// Concurrent kernels flag.
    pub concurrent_kernels: i32,
    /// Async engine count.
    pub async_engine_count: i32,
    /// Cooperative launch flag.
    pub cooperative_launch: i32,
}

impl NativeDescriptor for HipDeviceDescriptor {
    fn normalize(&self, ordinal: usize, index: usize) -> DeviceProps {
        let bytes = |value: i32| usize::try_from(value).unwrap_or(0);
        DeviceProps {
            ordinal,
            index,
            name: DeviceName::from_raw(&self.name),
            major: self.major,
            minor: self.minor,
            total_memory: self.total_global_mem,
            sms_count: self.multi_processor_count,
            sm_threads: self.max_threads_per_multi_processor,
            sm_shared_memory: bytes(self.max_shared_memory_per_multi_processor),
            sm_registers: self.regs_per_multiprocessor,
            sm_blocks: self.max_blocks_per_multi_processor,
            block_threads: self.max_threads_per_block,
            block_shared_memory: bytes(self.shared_mem_per_block),
            block_registers: self.regs_per_block,
            warp_size: self.warp_size,
            l2_cache_size: self.l2_cache_size,
            concurrent_kernels: self.concurrent_kernels != 0,
            async_engines_count: self.async_engine_count,
            cooperative: self.cooperative_launch != 0,
            ..DeviceProps::empty(Provider::HIP)
        }
    }
}

struct HipApi {
    hip_init: FnHipInit,
    hip_get_device_count: FnHipGetDeviceCount,
    hip_device_get: FnHipDeviceGet,
    hip_device_get_name: FnHipDeviceGetName,
    hip_device_total_mem: FnHipDeviceTotalMem,
    hip_device_get_attribute: FnHipDeviceGetAttribute,
}

/// HIP runtime loaded from `libamdhip64`.
pub struct HipDriver {
    api: HipApi,
    initialized: bool,
    library: DriverLibrary,
}

impl HipDriver {
    fn init(&mut self) -> Result<(), CallError> {
        if !self.initialized {
            // SAFETY: hipInit only requires flags == 0.
            check_status("hipInit", unsafe { (self.api.hip_init)(0) })?;
            self.initialized = true;
        }
        Ok(())
    }

    fn attribute(&self, device: HipDevice, attribute: i32) -> Result<i32, CallError> {
        let mut value: c_int = 0;
        // SAFETY: `value` is a valid out pointer; HIP device handles are ordinals.
        let status = unsafe { (self.api.hip_device_get_attribute)(&mut value, attribute, device) };
        check_status("hipDeviceGetAttribute", status)?;
        Ok(value)
    }
}

impl Driver for HipDriver {
    type Locator = LocationHints;
    type Descriptor = HipDeviceDescriptor;

    const NO_DEVICE: NativeStatus = HIP_ERROR_NO_DEVICE;

    fn provider(_: &LocationHints) -> Provider {
        Provider::HIP
    }

    fn open(hints: &LocationHints, diagnostics: &mut Diagnostics) -> Result<Self, LoadError> {
        let candidates = hints.candidates(LIBRARY_NAMES);
        let library = DriverLibrary::load(candidates, REQUIRED_SYMBOLS, diagnostics)?;
        // SAFETY: signatures follow hip_runtime_api.h; the table is stored
        // next to the library it was resolved from.
        let api = unsafe {
            HipApi {
                hip_init: library.symbol("hipInit")?,
                hip_get_device_count: library.symbol("hipGetDeviceCount")?,
                hip_device_get: library.symbol("hipDeviceGet")?,
                hip_device_get_name: library.symbol("hipDeviceGetName")?,
                hip_device_total_mem: library.symbol("hipDeviceTotalMem")?,
                hip_device_get_attribute: library.symbol("hipDeviceGetAttribute")?,
            }
        };
        info!(path = %library.path().display(), "loaded HIP runtime");
        Ok(Self {
            api,
            initialized: false,
            library,
        })
    }

    fn device_count(&mut self) -> Result<usize, CallError> {
        self.init()?;
        let mut count: c_int = 0;
        // SAFETY: `count` is a valid out pointer.
        check_status("hipGetDeviceCount", unsafe { (self.api.hip_get_device_count)(&mut count) })?;
        debug!(count, path = %self.library.path().display(), "HIP device count");
        native_count("hipGetDeviceCount", count, HIP_ERROR_INVALID_VALUE)
    }

    fn describe(&mut self, index: usize) -> Result<HipDeviceDescriptor, CallError> {
        self.init()?;
        let ordinal = c_int::try_from(index)
            .map_err(|_| CallError::new("hipDeviceGet", HIP_ERROR_INVALID_DEVICE))?;

        let mut device: HipDevice = 0;
        // SAFETY: `device` is a valid out pointer.
        check_status("hipDeviceGet", unsafe { (self.api.hip_device_get)(&mut device, ordinal) })?;

        let mut name = [0u8; 256];
        // SAFETY: the buffer holds `name.len()` bytes.
        let status = unsafe {
            let buffer = name.as_mut_ptr().cast::<c_char>();
            (self.api.hip_device_get_name)(buffer, name.len() as c_int, device)
        };
        check_status("hipDeviceGetName", status)?;
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());

        let mut total_global_mem = 0usize;
        // SAFETY: `total_global_mem` is a valid out pointer.
        check_status("hipDeviceTotalMem", unsafe {
            (self.api.hip_device_total_mem)(&mut total_global_mem, device)
        })?;

        let get = |attribute| self.attribute(device, attribute);
        Ok(HipDeviceDescriptor {
            name: name[..end].to_vec(),
            total_global_mem,
            major: get(attr::COMPUTE_CAPABILITY_MAJOR)?,
            minor: get(attr::COMPUTE_CAPABILITY_MINOR)?,
            multi_processor_count: get(attr::MULTIPROCESSOR_COUNT)?,
            max_threads_per_multi_processor: get(attr::MAX_THREADS_PER_MULTIPROCESSOR)?,
            max_shared_memory_per_multi_processor: get(attr::SHARED_MEM_PER_MULTIPROCESSOR)?,
            regs_per_multiprocessor: get(attr::MAX_REGISTERS_PER_MULTIPROCESSOR)?,
            max_blocks_per_multi_processor: get(attr::MAX_BLOCKS_PER_MULTIPROCESSOR)?,
            max_threads_per_block: get(attr::MAX_THREADS_PER_BLOCK)?,
            shared_mem_per_block: get(attr::SHARED_MEM_PER_BLOCK)?,
            regs_per_block: get(attr::MAX_REGISTERS_PER_BLOCK)?,
            warp_size: get(attr::WARP_SIZE)?,
            l2_cache_size: get(attr::L2_CACHE_SIZE)?,
            concurrent_kernels: get(attr::CONCURRENT_KERNELS)?,
            async_engine_count: get(attr::ASYNC_ENGINE_COUNT)?,
            cooperative_launch: get(attr::COOPERATIVE_LAUNCH)?,
        })
    }
}
