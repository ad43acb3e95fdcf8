//! Mapping of device query errors onto Python exceptions.

use gpuq_core::GpuError;
use pyo3::create_exception;
use pyo3::exceptions::{PyIndexError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;

create_exception!(_gpuq, GpuUnavailableError, PyRuntimeError, "A GPU runtime could not be loaded");
create_exception!(_gpuq, GpuQueryError, PyRuntimeError, "A GPU runtime call failed");

/// Convert a [`GpuError`] to the matching Python exception.
///
/// | error | exception |
/// |---|---|
/// | `InvalidIndex` | `IndexError` |
/// | `Unavailable` | `GpuUnavailableError` |
/// | `QueryFailed`, `NoDevice` | `GpuQueryError` |
/// | `ProviderRequired` | `RuntimeError` |
/// | `InvalidConfig` | `ValueError` |
pub fn to_py_err(err: GpuError) -> PyErr {
    let message = err.to_string();
    match err {
        GpuError::InvalidIndex { .. } => PyIndexError::new_err(message),
        GpuError::Unavailable { diagnostics: Some(text), .. } => {
            GpuUnavailableError::new_err(format!("{message}\n{text}"))
        }
        GpuError::Unavailable { .. } => GpuUnavailableError::new_err(message),
        GpuError::QueryFailed { .. } | GpuError::NoDevice { .. } => GpuQueryError::new_err(message),
        GpuError::ProviderRequired { .. } => PyRuntimeError::new_err(message),
        GpuError::InvalidConfig { .. } => PyValueError::new_err(message),
    }
}

/// Helper function to create a type error.
pub fn type_error(expected: &str, got: &str) -> PyErr {
    PyTypeError::new_err(format!("Expected {expected}, but got {got}"))
}

/// Helper function to create a value error.
pub fn value_error(msg: impl Into<String>) -> PyErr {
    PyValueError::new_err(msg.into())
}

/// Register all custom exceptions with the Python module.
pub fn register_exceptions(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add("GpuUnavailableError", module.py().get_type_bound::<GpuUnavailableError>())?;
    module.add("GpuQueryError", module.py().get_type_bound::<GpuQueryError>())?;
    Ok(())
}
