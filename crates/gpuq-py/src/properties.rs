//! Python view of a device.

use gpuq_core::query::Properties;
use pyo3::basic::CompareOp;
use pyo3::prelude::*;
use pyo3::types::PyDict;

/// Properties of one GPU, as seen from this process.
///
/// Instances are snapshots: visibility is decided when the object is created
/// and does not follow later changes of `*_VISIBLE_DEVICES`.
#[pyclass(name = "Properties", module = "gpuq", frozen)]
#[derive(Clone)]
pub struct PyProperties {
    pub(crate) inner: Properties,
}

impl From<Properties> for PyProperties {
    fn from(inner: Properties) -> Self {
        Self { inner }
    }
}

#[pymethods]
impl PyProperties {
    /// Ordinal of the GPU across all providers.
    #[getter]
    fn ord(&self) -> usize {
        self.inner.ord()
    }

    /// Provider flag (`CUDA` or `HIP`).
    #[getter]
    fn provider(&self) -> u32 {
        self.inner.provider().bits()
    }

    /// Provider name.
    #[getter]
    fn provider_name(&self) -> &str {
        self.inner.provider_name.as_str()
    }

    /// Index seen by this process, `None` if the GPU is hidden.
    #[getter]
    fn index(&self) -> Option<usize> {
        self.inner.index()
    }

    /// Alias of `index`.
    #[getter]
    fn local_index(&self) -> Option<usize> {
        self.inner.local_index()
    }

    /// Index when `*_VISIBLE_DEVICES` is ignored.
    #[getter]
    fn system_index(&self) -> usize {
        self.inner.system_index()
    }

    /// Whether this process can use the GPU.
    #[getter]
    fn is_visible(&self) -> bool {
        self.inner.is_visible()
    }

    #[getter]
    fn name(&self) -> &str {
        self.inner.name.as_str()
    }

    #[getter]
    fn major(&self) -> i32 {
        self.inner.major
    }

    #[getter]
    fn minor(&self) -> i32 {
        self.inner.minor
    }

    #[getter]
    fn total_memory(&self) -> usize {
        self.inner.total_memory
    }

    #[getter]
    fn sms_count(&self) -> i32 {
        self.inner.sms_count
    }

    #[getter]
    fn sm_threads(&self) -> i32 {
        self.inner.sm_threads
    }

    #[getter]
    fn sm_shared_memory(&self) -> usize {
        self.inner.sm_shared_memory
    }

    #[getter]
    fn sm_registers(&self) -> i32 {
        self.inner.sm_registers
    }

    #[getter]
    fn sm_blocks(&self) -> i32 {
        self.inner.sm_blocks
    }

    #[getter]
    fn block_threads(&self) -> i32 {
        self.inner.block_threads
    }

    #[getter]
    fn block_shared_memory(&self) -> usize {
        self.inner.block_shared_memory
    }

    #[getter]
    fn block_registers(&self) -> i32 {
        self.inner.block_registers
    }

    #[getter]
    fn warp_size(&self) -> i32 {
        self.inner.warp_size
    }

    #[getter]
    fn l2_cache_size(&self) -> i32 {
        self.inner.l2_cache_size
    }

    #[getter]
    fn concurrent_kernels(&self) -> bool {
        self.inner.concurrent_kernels
    }

    #[getter]
    fn async_engines_count(&self) -> i32 {
        self.inner.async_engines_count
    }

    #[getter]
    fn cooperative(&self) -> bool {
        self.inner.cooperative
    }

    /// Plain dictionary of every property.
    ///
    /// Args:
    ///     strip_index: leave out `ord`, `index` and `system_index`
    #[pyo3(signature = (strip_index = false))]
    fn asdict<'py>(&self, py: Python<'py>, strip_index: bool) -> PyResult<Bound<'py, PyDict>> {
        let p = &self.inner;
        let dict = PyDict::new_bound(py);
        if !strip_index {
            dict.set_item("ord", p.ord())?;
        }
        dict.set_item("provider", p.provider_name.as_str())?;
        if !strip_index {
            dict.set_item("index", p.index())?;
            dict.set_item("system_index", p.system_index())?;
        }
        dict.set_item("name", p.name.as_str())?;
        dict.set_item("major", p.major)?;
        dict.set_item("minor", p.minor)?;
        dict.set_item("total_memory", p.total_memory)?;
        dict.set_item("sms_count", p.sms_count)?;
        dict.set_item("sm_threads", p.sm_threads)?;
        dict.set_item("sm_shared_memory", p.sm_shared_memory)?;
        dict.set_item("sm_registers", p.sm_registers)?;
        dict.set_item("sm_blocks", p.sm_blocks)?;
        dict.set_item("block_threads", p.block_threads)?;
        dict.set_item("block_shared_memory", p.block_shared_memory)?;
        dict.set_item("block_registers", p.block_registers)?;
        dict.set_item("warp_size", p.warp_size)?;
        dict.set_item("l2_cache_size", p.l2_cache_size)?;
        dict.set_item("concurrent_kernels", p.concurrent_kernels)?;
        dict.set_item("async_engines_count", p.async_engines_count)?;
        dict.set_item("cooperative", p.cooperative)?;
        Ok(dict)
    }

    fn __richcmp__(&self, other: &Bound<'_, PyAny>, op: CompareOp) -> PyObject {
        let py = other.py();
        let Ok(other) = other.downcast::<Self>() else {
            return py.NotImplemented();
        };
        let same = self.inner == other.get().inner;
        match op {
            CompareOp::Eq => same.into_py(py),
            CompareOp::Ne => (!same).into_py(py),
            _ => py.NotImplemented(),
        }
    }

    fn __repr__(&self) -> String {
        let text = self.inner.to_string();
        text.split_once('{').map_or(text.clone(), |(head, _)| head.to_string())
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }
}
