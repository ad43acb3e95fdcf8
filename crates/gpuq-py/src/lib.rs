//! Python bindings for gpuq.
//!
//! The module-level functions query the real drivers through one process-wide
//! [`GenuineImplementation`], unless a `MockImplementation` is active.
//!
//! Architecture:
//! - `properties`: the `Properties` class
//! - `mock`: the `MockImplementation` class and its context-manager stack
//! - `error`: error conversion utilities

use std::path::PathBuf;

use gpuq_core::config::LocationHints;
use gpuq_core::implementation::{GenuineImplementation, Implementation};
use gpuq_core::provider::Provider;
use gpuq_core::query::{Properties, Query, Required};
use gpuq_core::GpuError;
use once_cell::sync::Lazy;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyBytes, PyList};

mod error;
mod mock;
mod properties;

use error::{to_py_err, type_error, value_error};
use properties::PyProperties;

static GENUINE: Lazy<GenuineImplementation> = Lazy::new(GenuineImplementation::default);

fn with_current<R>(f: impl FnOnce(&dyn Implementation) -> R) -> R {
    match mock::active() {
        Some(mock) => f(&*mock),
        None => f(&*GENUINE),
    }
}

/// Parse a provider filter given as flag bits.
pub(crate) fn provider_filter(bits: u32) -> PyResult<Provider> {
    Provider::from_bits(bits)
        .ok_or_else(|| value_error(format!("unknown provider flags: {bits:#x}")))
}

/// Parse the `required` argument: `None`, a bool, or provider flag bits.
pub(crate) fn required_providers(required: Option<&Bound<'_, PyAny>>) -> PyResult<Required> {
    let Some(required) = required else {
        return Ok(Required::No);
    };
    if required.is_none() {
        return Ok(Required::No);
    }
    if let Ok(flag) = required.downcast::<PyBool>() {
        return Ok(Required::from(flag.is_true()));
    }
    match required.extract::<u32>() {
        Ok(bits) => Ok(Required::Providers(provider_filter(bits)?)),
        Err(_) => Err(type_error(
            "None, bool or provider flags",
            &required.get_type().to_string(),
        )),
    }
}

/// `Query::get` accepting the signed indices Python passes in.
pub(crate) fn get_device<I: Implementation + ?Sized>(
    imp: &I,
    idx: i64,
    provider: Provider,
    visible_only: bool,
) -> gpuq_core::Result<Properties> {
    match usize::try_from(idx) {
        Ok(idx) => imp.get(idx, provider, visible_only),
        Err(_) => Err(GpuError::invalid_index(idx, imp.count(provider, visible_only)?)),
    }
}

#[cfg(unix)]
fn hint_path(raw: &[u8]) -> PyResult<PathBuf> {
    use std::os::unix::ffi::OsStrExt;
    Ok(PathBuf::from(std::ffi::OsStr::from_bytes(raw)))
}

#[cfg(not(unix))]
fn hint_path(raw: &[u8]) -> PyResult<PathBuf> {
    std::str::from_utf8(raw)
        .map(PathBuf::from)
        .map_err(|_| value_error("location hints must be valid UTF-8"))
}

/// Whether the CUDA driver library can be loaded.
#[pyfunction]
fn checkcuda() -> bool {
    GENUINE.facade().check_cuda()
}

/// Whether the HIP runtime library can be loaded.
#[pyfunction]
fn checkamd() -> bool {
    GENUINE.facade().check_amd()
}

/// Whether a CUDA runtime is present.
#[pyfunction]
fn hascuda() -> bool {
    with_current(|imp| imp.has_cuda())
}

/// Whether a HIP runtime is present.
#[pyfunction]
fn hasamd() -> bool {
    with_current(|imp| imp.has_amd())
}

/// Whether the runtimes of every provider in `provider` are present.
///
/// With `ANY`, whether at least one runtime is present.
#[pyfunction]
#[pyo3(signature = (provider = 0))]
fn hasprovider(provider: u32) -> PyResult<bool> {
    let provider = provider_filter(provider)?;
    Ok(with_current(|imp| imp.has_provider(provider)))
}

/// Number of GPUs matching the filter.
#[pyfunction]
#[pyo3(signature = (provider = 0, visible_only = true))]
fn count(provider: u32, visible_only: bool) -> PyResult<usize> {
    let provider = provider_filter(provider)?;
    with_current(|imp| imp.count(provider, visible_only)).map_err(to_py_err)
}

/// The `idx`-th GPU matching the filter.
///
/// Raises:
///     IndexError: if there are not enough matching GPUs
#[pyfunction]
#[pyo3(signature = (idx, provider = 0, visible_only = true))]
fn get(idx: i64, provider: u32, visible_only: bool) -> PyResult<PyProperties> {
    let provider = provider_filter(provider)?;
    with_current(|imp| get_device(imp, idx, provider, visible_only))
        .map(PyProperties::from)
        .map_err(to_py_err)
}

/// Every GPU matching the filter.
///
/// Args:
///     provider: provider flags to keep (`ANY` keeps everything)
///     visible_only: skip GPUs hidden by `*_VISIBLE_DEVICES`
///     required: providers that must have at least one GPU; `True` means
///         the `provider` filter
///
/// Raises:
///     RuntimeError: if a required provider has no GPU
#[pyfunction]
#[pyo3(signature = (provider = 0, visible_only = true, required = None))]
fn query(
    provider: u32,
    visible_only: bool,
    required: Option<&Bound<'_, PyAny>>,
) -> PyResult<Vec<PyProperties>> {
    let provider = provider_filter(provider)?;
    let required = required_providers(required)?;
    let devices =
        with_current(|imp| imp.query(provider, visible_only, required)).map_err(to_py_err)?;
    Ok(devices.into_iter().map(PyProperties::from).collect())
}

/// Loader diagnostics of a provider whose runtime failed to load.
#[pyfunction]
fn diagnostics(provider: u32) -> PyResult<Option<String>> {
    Ok(GENUINE.facade().diagnostics(provider_filter(provider)?))
}

/// Unload both runtimes. They are loaded again on next use.
#[pyfunction]
fn clean() {
    GENUINE.facade().clean();
}

/// Replace the directories searched for driver libraries.
#[pyfunction]
#[pyo3(signature = (hints, /))]
fn _set_location_hints(hints: &Bound<'_, PyAny>) -> PyResult<()> {
    let list = hints.downcast::<PyList>()?;
    let mut dirs = Vec::with_capacity(list.len());
    for item in list.iter() {
        let raw = item.downcast::<PyBytes>()?;
        dirs.push(hint_path(raw.as_bytes())?);
    }
    let hints = LocationHints::new(dirs).map_err(to_py_err)?;
    GENUINE.set_location_hints(&hints);
    Ok(())
}

/// Go back to the default library directories.
#[pyfunction]
fn _restore_default_hints() {
    GENUINE.set_location_hints(LocationHints::defaults());
}

/// gpuq: runtime discovery of CUDA and ROCm/HIP GPUs.
#[pymodule]
fn _gpuq(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    m.add("CUDA", Provider::CUDA.bits())?;
    m.add("HIP", Provider::HIP.bits())?;
    m.add("ANY", Provider::any().bits())?;
    m.add("ALL", Provider::all().bits())?;

    m.add_class::<PyProperties>()?;
    m.add_class::<mock::PyMockImplementation>()?;

    m.add_function(wrap_pyfunction!(checkcuda, m)?)?;
    m.add_function(wrap_pyfunction!(checkamd, m)?)?;
    m.add_function(wrap_pyfunction!(hascuda, m)?)?;
    m.add_function(wrap_pyfunction!(hasamd, m)?)?;
    m.add_function(wrap_pyfunction!(hasprovider, m)?)?;
    m.add_function(wrap_pyfunction!(count, m)?)?;
    m.add_function(wrap_pyfunction!(get, m)?)?;
    m.add_function(wrap_pyfunction!(query, m)?)?;
    m.add_function(wrap_pyfunction!(diagnostics, m)?)?;
    m.add_function(wrap_pyfunction!(clean, m)?)?;
    m.add_function(wrap_pyfunction!(_set_location_hints, m)?)?;
    m.add_function(wrap_pyfunction!(_restore_default_hints, m)?)?;

    error::register_exceptions(m)?;

    Ok(())
}
