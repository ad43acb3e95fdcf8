//! NVIDIA CUDA driver API backend.
//!
//! Talks to `libcuda` directly, so no CUDA toolkit is needed at build or run
//! time. Device properties are read attribute by attribute through
//! `cuDeviceGetAttribute`, which is stable across driver versions, rather
//! than through the versioned `cudaDeviceProp` layout of the runtime API.

use std::ffi::{c_char, c_int, c_uint};

use tracing::{debug, info};

use super::{check_status, native_count, CallError, Driver, NativeDescriptor, NativeStatus};
use crate::config::LocationHints;
use crate::diagnostics::Diagnostics;
use crate::error::LoadError;
use crate::loader::DriverLibrary;
use crate::provider::Provider;
use crate::record::{DeviceName, DeviceProps};

type CuDevice = c_int;

type FnCuInit = unsafe extern "C" fn(flags: c_uint) -> NativeStatus;
type FnCuDeviceGetCount = unsafe extern "C" fn(count: *mut c_int) -> NativeStatus;
type FnCuDeviceGet = unsafe extern "C" fn(device: *mut CuDevice, ordinal: c_int) -> NativeStatus;
type FnCuDeviceGetName =
    unsafe extern "C" fn(name: *mut c_char, len: c_int, dev: CuDevice) -> NativeStatus;
type FnCuDeviceTotalMem = unsafe extern "C" fn(bytes: *mut usize, dev: CuDevice) -> NativeStatus;
type FnCuDeviceGetAttribute =
    unsafe extern "C" fn(value: *mut c_int, attrib: c_int, dev: CuDevice) -> NativeStatus;

/// `CUDA_ERROR_INVALID_VALUE`.
pub const CUDA_ERROR_INVALID_VALUE: NativeStatus = 1;

/// `CUDA_ERROR_NO_DEVICE`.
pub const CUDA_ERROR_NO_DEVICE: NativeStatus = 100;

/// `CUDA_ERROR_INVALID_DEVICE`.
pub const CUDA_ERROR_INVALID_DEVICE: NativeStatus = 101;

/// Shared object names tried before the location hints.
#[cfg(windows)]
pub const LIBRARY_NAMES: &[&str] = &["nvcuda.dll"];
/// Shared object names tried before the location hints.
#[cfg(not(windows))]
pub const LIBRARY_NAMES: &[&str] = &["libcuda.so.1", "libcuda.so"];

/// Entry points that must be exported by the driver.
pub const REQUIRED_SYMBOLS: &[&str] = &[
    "cuInit",
    "cuDeviceGetCount",
    "cuDeviceGet",
    "cuDeviceGetName",
    "cuDeviceTotalMem_v2",
    "cuDeviceGetAttribute",
];

/// `CUdevice_attribute` values used to fill the record.
mod attr {
    pub const MAX_THREADS_PER_BLOCK: i32 = 1;
    pub const MAX_SHARED_MEMORY_PER_BLOCK: i32 = 8;
    pub const WARP_SIZE: i32 = 10;
    pub const MAX_REGISTERS_PER_BLOCK: i32 = 12;
    pub const MULTIPROCESSOR_COUNT: i32 = 16;
    pub const CONCURRENT_KERNELS: i32 = 31;
    pub const L2_CACHE_SIZE: i32 = 38;
    pub const MAX_THREADS_PER_MULTIPROCESSOR: i32 = 39;
    pub const ASYNC_ENGINE_COUNT: i32 = 40;
    pub const COMPUTE_CAPABILITY_MAJOR: i32 = 75;
    pub const COMPUTE_CAPABILITY_MINOR: i32 = 76;
    pub const MAX_SHARED_MEMORY_PER_MULTIPROCESSOR: i32 = 81;
    pub const MAX_REGISTERS_PER_MULTIPROCESSOR: i32 = 82;
    pub const COOPERATIVE_LAUNCH: i32 = 95;
    pub const MAX_BLOCKS_PER_MULTIPROCESSOR: i32 = 106;
}

/// Raw CUDA device description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CudaDeviceDescriptor {
    /// Bytes written by `cuDeviceGetName`, up to the terminator.
    pub name: Vec<u8>,
    /// `cuDeviceTotalMem_v2`.
    pub total_mem: usize,
    /// Compute capability major.
    pub major: i32,
    /// Compute capability minor.
    pub minor: i32,
    /// Multiprocessor count.
    pub multiprocessor_count: i32,
    /// Max threads per multiprocessor.
    pub max_threads_per_multiprocessor: i32,
    /// Shared memory per multiprocessor.
    pub shared_mem_per_multiprocessor: i32,
    /// Registers per multiprocessor.
    pub regs_per_multiprocessor: i32,
    /// Max blocks per multiprocessor.
    pub max_blocks_per_multiprocessor: i32,
    /// Max threads per block.
    pub max_threads_per_block: i32,
    /// Shared memory per block.
    pub shared_mem_per_block: i32,
    /// Registers per block.
    pub regs_per_block: i32,
    /// Warp size.
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

fn bytes(value: i32) -> usize {
    usize::try_from(value).unwrap_or(0)
}

impl NativeDescriptor for CudaDeviceDescriptor {
    fn normalize(&self, ordinal: usize, index: usize) -> DeviceProps {
        DeviceProps {
            ordinal,
            index,
            name: DeviceName::from_raw(&self.name),
            major: self.major,
            minor: self.minor,
            total_memory: self.total_mem,
            sms_count: self.multiprocessor_count,
            sm_threads: self.max_threads_per_multiprocessor,
            sm_shared_memory: bytes(self.shared_mem_per_multiprocessor),
            sm_registers: self.regs_per_multiprocessor,
            sm_blocks: self.max_blocks_per_multiprocessor,
            block_threads: self.max_threads_per_block,
            block_shared_memory: bytes(self.shared_mem_per_block),
            block_registers: self.regs_per_block,
            warp_size: self.warp_size,
            l2_cache_size: self.l2_cache_size,
            concurrent_kernels: self.concurrent_kernels != 0,
            async_engines_count: self.async_engine_count,
            cooperative: self.cooperative_launch != 0,
            ..DeviceProps::empty(Provider::CUDA)
        }
    }
}

struct CudaApi {
    cu_init: FnCuInit,
    cu_device_get_count: FnCuDeviceGetCount,
    cu_device_get: FnCuDeviceGet,
    cu_device_get_name: FnCuDeviceGetName,
    cu_device_total_mem: FnCuDeviceTotalMem,
    cu_device_get_attribute: FnCuDeviceGetAttribute,
}

impl CudaApi {
    /// # Safety
    ///
    /// `library` must be a CUDA driver and must outlive the returned table.
    unsafe fn resolve(library: &DriverLibrary) -> Result<Self, LoadError> {
        // SAFETY: the signatures match the CUDA driver API headers.
        unsafe {
            Ok(Self {
                cu_init: library.symbol("cuInit")?,
                cu_device_get_count: library.symbol("cuDeviceGetCount")?,
                cu_device_get: library.symbol("cuDeviceGet")?,
                cu_device_get_name: library.symbol("cuDeviceGetName")?,
                cu_device_total_mem: library.symbol("cuDeviceTotalMem_v2")?,
                cu_device_get_attribute: library.symbol("cuDeviceGetAttribute")?,
            })
        }
    }
}

/// CUDA driver loaded from `libcuda`.
pub struct CudaDriver {
    api: CudaApi,
    initialized: bool,
    // Declared last: the function table must not outlive the library.
    library: DriverLibrary,
}

impl CudaDriver {
    fn init(&mut self) -> Result<(), CallError> {
        if !self.initialized {
            // SAFETY: cuInit only requires flags == 0.
            check_status("cuInit", unsafe { (self.api.cu_init)(0) })?;
            self.initialized = true;
        }
        Ok(())
    }

    fn attribute(&self, device: CuDevice, attribute: i32) -> Result<i32, CallError> {
        let mut value: c_int = 0;
        // SAFETY: `value` is a valid out pointer and `device` came from cuDeviceGet.
        let status = unsafe { (self.api.cu_device_get_attribute)(&mut value, attribute, device) };
        check_status("cuDeviceGetAttribute", status)?;
        Ok(value)
    }
}

impl Driver for CudaDriver {
    type Locator = LocationHints;
    type Descriptor = CudaDeviceDescriptor;

    const NO_DEVICE: NativeStatus = CUDA_ERROR_NO_DEVICE;

    fn provider(_: &LocationHints) -> Provider {
        Provider::CUDA
    }

    fn open(hints: &LocationHints, diagnostics: &mut Diagnostics) -> Result<Self, LoadError> {
        let candidates = hints.candidates(LIBRARY_NAMES);
        let library = DriverLibrary::load(candidates, REQUIRED_SYMBOLS, diagnostics)?;
        // SAFETY: the table is stored next to the library it came from.
        let api = unsafe { CudaApi::resolve(&library) }?;
        info!(path = %library.path().display(), "loaded CUDA driver");
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
        check_status("cuDeviceGetCount", unsafe { (self.api.cu_device_get_count)(&mut count) })?;
        debug!(count, path = %self.library.path().display(), "CUDA device count");
        native_count("cuDeviceGetCount", count, CUDA_ERROR_INVALID_VALUE)
    }

    fn describe(&mut self, index: usize) -> Result<CudaDeviceDescriptor, CallError> {
        self.init()?;
        let ordinal = c_int::try_from(index)
            .map_err(|_| CallError::new("cuDeviceGet", CUDA_ERROR_INVALID_DEVICE))?;

        let mut device: CuDevice = 0;
        // SAFETY: `device` is a valid out pointer.
        check_status("cuDeviceGet", unsafe { (self.api.cu_device_get)(&mut device, ordinal) })?;

        let mut name = [0u8; 256];
        // SAFETY: the buffer holds `name.len()` bytes.
        let status = unsafe {
            let buffer = name.as_mut_ptr().cast::<c_char>();
            (self.api.cu_device_get_name)(buffer, name.len() as c_int, device)
        };
        check_status("cuDeviceGetName", status)?;
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());

        let mut total_mem = 0usize;
        // SAFETY: `total_mem` is a valid out pointer.
        check_status("cuDeviceTotalMem_v2", unsafe {
            (self.api.cu_device_total_mem)(&mut total_mem, device)
        })?;

        let get = |attribute| self.attribute(device, attribute);
        Ok(CudaDeviceDescriptor {
            name: name[..end].to_vec(),
            total_mem,
            major: get(attr::COMPUTE_CAPABILITY_MAJOR)?,
            minor: get(attr::COMPUTE_CAPABILITY_MINOR)?,
            multiprocessor_count: get(attr::MULTIPROCESSOR_COUNT)?,
            max_threads_per_multiprocessor: get(attr::MAX_THREADS_PER_MULTIPROCESSOR)?,
            shared_mem_per_multiprocessor: get(attr::MAX_SHARED_MEMORY_PER_MULTIPROCESSOR)?,
            regs_per_multiprocessor: get(attr::MAX_REGISTERS_PER_MULTIPROCESSOR)?,
            max_blocks_per_multiprocessor: get(attr::MAX_BLOCKS_PER_MULTIPROCESSOR)?,
            max_threads_per_block: get(attr::MAX_THREADS_PER_BLOCK)?,
            shared_mem_per_block: get(attr::MAX_SHARED_MEMORY_PER_BLOCK)?,
            regs_per_block: get(attr::MAX_REGISTERS_PER_BLOCK)?,
            warp_size: get(attr::WARP_SIZE)?,
            l2_cache_size: get(attr::L2_CACHE_SIZE)?,
            concurrent_kernels: get(attr::CONCURRENT_KERNELS)?,
            async_engine_count: get(attr::ASYNC_ENGINE_COUNT)?,
            cooperative_launch: get(attr::COOPERATIVE_LAUNCH)?,
        })
    }
}
