//! User script loading.
//!
//! One script per worker session, executed exactly once. Top-level side
//! effects (heavy imports, model loading) run at first use and are amortized
//! across every subsequent call - the whole point of keeping the worker
//! process alive.

use std::path::{Path, PathBuf};

use pyo3::prelude::*;
use pyo3::types::PyModule;
use uuid::Uuid;

use pywork::CallError;

use crate::pyerr;

/// A user script executed as a module. Immutable after load; re-loading
/// within a session is not supported (a host wanting fresh code restarts
/// the worker).
#[derive(Debug)]
pub struct LoadedScript {
    module: Py<PyModule>,
    path: PathBuf,
}

impl LoadedScript {
    /// Execute `path` as a fresh module under a synthetic name.
    ///
    /// The module never enters `sys.modules`: a shared registry entry could
    /// collide with another session loading a same-named script.
    pub fn load(py: Python<'_>, path: &Path) -> Result<Self, CallError> {
        if !path.exists() {
            return Err(CallError::load(format!(
                "script not found: {}",
                path.display()
            )));
        }

        let module_name = format!("pywork_user_{}", Uuid::new_v4().simple());
        let module = exec_module(py, &module_name, path)
            .map_err(|e| CallError::load(pyerr::message_with_traceback(py, &e)))?;

        tracing::info!(script = %path.display(), "user script loaded");
        Ok(Self {
            module: module.unbind(),
            path: path.to_path_buf(),
        })
    }

    pub fn module<'py>(&self, py: Python<'py>) -> Bound<'py, PyModule> {
        self.module.bind(py).clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn exec_module<'py>(
    py: Python<'py>,
    module_name: &str,
    path: &Path,
) -> PyResult<Bound<'py, PyModule>> {
    let importlib_util = py.import("importlib.util")?;

    let spec = importlib_util.call_method1(
        "spec_from_file_location",
        (module_name, path.to_string_lossy().into_owned()),
    )?;
    if spec.is_none() {
        return Err(pyo3::exceptions::PyImportError::new_err(format!(
            "cannot build import spec for {}",
            path.display()
        )));
    }

    let module = importlib_util.call_method1("module_from_spec", (&spec,))?;
    spec.getattr("loader")?
        .call_method1("exec_module", (&module,))?;

    module.downcast_into::<PyModule>().map_err(|e| e.into())
}
