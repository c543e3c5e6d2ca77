//! Python-visible logger handle.
//!
//! Injected into provider context mappings (and marked hook mappings) under
//! the `logger` key. Each method emits one marker-tagged JSON line on
//! stderr through the core bridge; the worker performs no level filtering.

use pyo3::prelude::*;

use pywork::logger::{self, LogLevel};

use crate::convert;

/// Handle user code sees as `context["logger"]`.
#[pyclass(name = "WorkerLogger", module = "pywork")]
#[derive(Clone, Default)]
pub struct WorkerLogger;

#[pymethods]
impl WorkerLogger {
    #[new]
    fn new() -> Self {
        Self
    }

    #[pyo3(signature = (message, data=None))]
    fn debug(&self, py: Python<'_>, message: &str, data: Option<Bound<'_, PyAny>>) -> PyResult<()> {
        emit(py, LogLevel::Debug, message, data)
    }

    #[pyo3(signature = (message, data=None))]
    fn info(&self, py: Python<'_>, message: &str, data: Option<Bound<'_, PyAny>>) -> PyResult<()> {
        emit(py, LogLevel::Info, message, data)
    }

    #[pyo3(signature = (message, data=None))]
    fn warn(&self, py: Python<'_>, message: &str, data: Option<Bound<'_, PyAny>>) -> PyResult<()> {
        emit(py, LogLevel::Warn, message, data)
    }

    #[pyo3(signature = (message, data=None))]
    fn error(&self, py: Python<'_>, message: &str, data: Option<Bound<'_, PyAny>>) -> PyResult<()> {
        emit(py, LogLevel::Error, message, data)
    }

    fn __repr__(&self) -> &'static str {
        "<pywork.WorkerLogger>"
    }
}

fn emit(
    py: Python<'_>,
    level: LogLevel,
    message: &str,
    data: Option<Bound<'_, PyAny>>,
) -> PyResult<()> {
    let data_value = match data {
        Some(obj) if !obj.is_none() => Some(convert::py_to_json_lenient(py, &obj)?),
        _ => None,
    };
    logger::log(level, message, data_value);
    Ok(())
}
