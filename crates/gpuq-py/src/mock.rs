//! Simulated machines for Python tests.

use std::sync::Arc;

use gpuq_core::mock::{mock_template, MockImplementation, MOCK_NAME};
use gpuq_core::query::Query;
use gpuq_core::record::{DeviceName, DeviceProps};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use pyo3::prelude::*;

use crate::error::{to_py_err, value_error};
use crate::properties::PyProperties;
use crate::{get_device, provider_filter, required_providers};

/// Mocks currently entered with `with`, innermost last.
pub(crate) static ACTIVE: Lazy<Mutex<Vec<Arc<MockImplementation>>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// Innermost active mock, if any.
pub(crate) fn active() -> Option<Arc<MockImplementation>> {
    ACTIVE.lock().last().cloned()
}

/// Validate a mock device count; `None` means the runtime is absent.
fn device_count(count: Option<i64>) -> PyResult<Option<usize>> {
    let Some(count) = count else {
        return Ok(None);
    };
    usize::try_from(count)
        .map(Some)
        .map_err(|_| value_error("negative number of mock devices"))
}

/// A fake machine with a fixed set of devices.
///
/// Used as a context manager, it replaces the real drivers for the
/// module-level query functions:
///
/// ```python
/// with gpuq.MockImplementation(cuda_count=2, cuda_visible=[1]):
///     assert gpuq.count() == 1
/// ```
///
/// A count of `None` means the runtime is not installed. The remaining
/// keyword arguments set the properties shared by every mock device; a `{}`
/// in `name` is replaced by the provider name.
#[pyclass(name = "MockImplementation", module = "gpuq", frozen)]
pub struct PyMockImplementation {
    inner: Arc<MockImplementation>,
}

#[pymethods]
impl PyMockImplementation {
    #[new]
    #[pyo3(signature = (
        cuda_count = Some(1),
        hip_count = None,
        cuda_visible = None,
        hip_visible = None,
        name = MOCK_NAME.to_owned(),
        major = 1,
        minor = 2,
        total_memory = 8 << 30,
        sms_count = 12,
        sm_threads = 2048,
        sm_shared_memory = 16 << 10,
        sm_registers = 512,
        sm_blocks = 4,
        block_threads = 1024,
        block_shared_memory = 8 << 10,
        block_registers = 256,
        warp_size = 32,
        l2_cache_size = 8 << 20,
        concurrent_kernels = true,
        async_engines_count = 0,
        cooperative = true,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        cuda_count: Option<i64>,
        hip_count: Option<i64>,
        cuda_visible: Option<Vec<i64>>,
        hip_visible: Option<Vec<i64>>,
        name: String,
        major: i32,
        minor: i32,
        total_memory: usize,
        sms_count: i32,
        sm_threads: i32,
        sm_shared_memory: usize,
        sm_registers: i32,
        sm_blocks: i32,
        block_threads: i32,
        block_shared_memory: usize,
        block_registers: i32,
        warp_size: i32,
        l2_cache_size: i32,
        concurrent_kernels: bool,
        async_engines_count: i32,
        cooperative: bool,
    ) -> PyResult<Self> {
        let template = DeviceProps {
            name: DeviceName::new(&name),
            major,
            minor,
            total_memory,
            sms_count,
            sm_threads,
            sm_shared_memory,
            sm_registers,
            sm_blocks,
            block_threads,
            block_shared_memory,
            block_registers,
            warp_size,
            l2_cache_size,
            concurrent_kernels,
            async_engines_count,
            cooperative,
            ..mock_template()
        };
        let mut mock = MockImplementation::new()
            .cuda(device_count(cuda_count)?)
            .hip(device_count(hip_count)?)
            .template(template);
        if let Some(indices) = cuda_visible {
            mock = mock.cuda_visible(indices);
        }
        if let Some(indices) = hip_visible {
            mock = mock.hip_visible(indices);
        }
        Ok(Self {
            inner: Arc::new(mock),
        })
    }

    fn hascuda(&self) -> bool {
        self.inner.has_cuda()
    }

    fn hasamd(&self) -> bool {
        self.inner.has_amd()
    }

    #[pyo3(signature = (provider = 0, visible_only = true))]
    fn count(&self, provider: u32, visible_only: bool) -> PyResult<usize> {
        self.inner
            .count(provider_filter(provider)?, visible_only)
            .map_err(to_py_err)
    }

    #[pyo3(signature = (idx, provider = 0, visible_only = true))]
    fn get(&self, idx: i64, provider: u32, visible_only: bool) -> PyResult<PyProperties> {
        get_device(&*self.inner, idx, provider_filter(provider)?, visible_only)
            .map(PyProperties::from)
            .map_err(to_py_err)
    }

    #[pyo3(signature = (provider = 0, visible_only = true, required = None))]
    fn query(
        &self,
        provider: u32,
        visible_only: bool,
        required: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Vec<PyProperties>> {
        let devices = self
            .inner
            .query(provider_filter(provider)?, visible_only, required_providers(required)?)
            .map_err(to_py_err)?;
        Ok(devices.into_iter().map(PyProperties::from).collect())
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        ACTIVE.lock().push(Arc::clone(&slf.inner));
        slf
    }

    #[pyo3(signature = (*_args))]
    fn __exit__(&self, _args: &Bound<'_, pyo3::types::PyTuple>) -> bool {
        let mut active = ACTIVE.lock();
        if let Some(pos) = active.iter().rposition(|m| Arc::ptr_eq(m, &self.inner)) {
            active.remove(pos);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_count() {
        assert_eq!(device_count(None).unwrap(), None);
        assert_eq!(device_count(Some(0)).unwrap(), Some(0));
        assert_eq!(device_count(Some(3)).unwrap(), Some(3));
        assert!(device_count(Some(-1)).is_err());
    }
}
