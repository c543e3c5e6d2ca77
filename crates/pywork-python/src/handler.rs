//! Bridge between the session loop and the embedded interpreter.
//!
//! Implements [`CallHandler`] for a single user script. Python work blocks
//! on the GIL, so every call runs on the blocking thread pool and the
//! session loop's reactor stays free. The script slot is loaded on first
//! use and reused verbatim afterwards - no re-execution within a session,
//! even if the file changes on disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyTuple};
use serde_json::Value;

use pywork::sanitize::{INJECT_MARKER_KEY, InjectionPlan, LOGGER_KEY, plan_injection};
use pywork::{CallError, CallHandler};

use crate::logger::WorkerLogger;
use crate::script::LoadedScript;
use crate::{convert, invoke, pyerr, resolver};

/// Results are walked in place to drop live logger handles before
/// `json.dumps`. The cap stops runaway descent into circular structures;
/// `dumps` raises its own circular-reference error right after.
const SCRUB_MAX_DEPTH: usize = 64;

/// One user script served over many calls.
pub struct PythonCallHandler {
    script_path: PathBuf,
    /// Loaded exactly once per worker lifetime; only touched under the GIL.
    script: Arc<Mutex<Option<LoadedScript>>>,
}

impl PythonCallHandler {
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            script: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait::async_trait]
impl CallHandler for PythonCallHandler {
    async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value, CallError> {
        let function = function.to_string();
        let path = self.script_path.clone();
        let slot = Arc::clone(&self.script);

        tokio::task::spawn_blocking(move || call_blocking(&path, &slot, &function, args))
            .await
            .map_err(|e| CallError::invoke(format!("worker task panicked: {e}"), None))?
    }
}

fn call_blocking(
    path: &Path,
    slot: &Mutex<Option<LoadedScript>>,
    function: &str,
    args: Vec<Value>,
) -> Result<Value, CallError> {
    Python::attach(|py| {
        let mut guard = slot
            .lock()
            .map_err(|_| CallError::invoke("worker script state poisoned", None))?;

        if guard.is_none() {
            *guard = Some(LoadedScript::load(py, path)?);
        }
        let Some(script) = guard.as_ref() else {
            return Err(CallError::load("script slot empty after load"));
        };

        let module = script.module(py);
        let resolved = resolver::resolve(&module, function)?;
        tracing::trace!(%function, kind = ?resolved.kind, "resolved call target");

        let plan = plan_injection(&args);
        let py_args = build_args(py, &args, &plan)?;

        let result = invoke::invoke(py, &resolved, py_args)
            .map_err(|e| pyerr::invoke_error(py, &e))?;

        scrub_runtime_objects(&result, 0)
            .map_err(|e| pyerr::invoke_error(py, &e))?;

        convert::py_to_json(py, &result).map_err(|e| CallError::serialize(e.to_string()))
    })
}

/// Convert JSON arguments to Python and hand the live logger to whichever
/// mapping the plan selected.
fn build_args<'py>(
    py: Python<'py>,
    args: &[Value],
    plan: &InjectionPlan,
) -> Result<Bound<'py, PyTuple>, CallError> {
    let mut items: Vec<Bound<'py, PyAny>> = Vec::with_capacity(args.len());
    for arg in args {
        let item = convert::json_to_py(py, arg)
            .map_err(|e| CallError::invoke(format!("failed to convert arguments: {e}"), None))?;
        items.push(item);
    }

    let inject = |index: &usize, strip_marker: bool| -> Result<(), CallError> {
        inject_logger(py, &items[*index], strip_marker)
            .map_err(|e| CallError::invoke(format!("failed to inject logger: {e}"), None))
    };

    match plan {
        InjectionPlan::None => {}
        InjectionPlan::TrailingMapping { index } => inject(index, false)?,
        InjectionPlan::MarkedMappings { indices } => {
            for index in indices {
                inject(index, true)?;
            }
        }
    }

    PyTuple::new(py, items)
        .map_err(|e| CallError::invoke(format!("failed to build argument tuple: {e}"), None))
}

fn inject_logger(py: Python<'_>, arg: &Bound<'_, PyAny>, strip_marker: bool) -> PyResult<()> {
    // The plan only selects mapping arguments, and json_to_py produces
    // dicts for JSON objects.
    let Ok(dict) = arg.downcast::<PyDict>() else {
        return Ok(());
    };

    if strip_marker && dict.contains(INJECT_MARKER_KEY)? {
        dict.del_item(INJECT_MARKER_KEY)?;
    }
    dict.set_item(LOGGER_KEY, Py::new(py, WorkerLogger)?)
}

/// Remove live runtime handles (`logger`, leftover markers) from the result
/// in place, at any depth, so `json.dumps` never sees an unserializable
/// handle the user merely echoed back.
fn scrub_runtime_objects(obj: &Bound<'_, PyAny>, depth: usize) -> PyResult<()> {
    if depth >= SCRUB_MAX_DEPTH {
        return Ok(());
    }

    if let Ok(dict) = obj.downcast::<PyDict>() {
        for key in [LOGGER_KEY, INJECT_MARKER_KEY] {
            if dict.contains(key)? {
                dict.del_item(key)?;
            }
        }
        for value in dict.values() {
            scrub_runtime_objects(&value, depth + 1)?;
        }
    } else if let Ok(list) = obj.downcast::<PyList>() {
        for item in list.iter() {
            scrub_runtime_objects(&item, depth + 1)?;
        }
    } else if let Ok(tuple) = obj.downcast::<PyTuple>() {
        for item in tuple.iter() {
            scrub_runtime_objects(&item, depth + 1)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_script;
    use serde_json::json;

    const SCRIPT: &str = "\
import asyncio

def add(a, b):
    return a + b

async def slow(x):
    await asyncio.sleep(0.01)
    return x * 2

class C:
    def m(self, x):
        return x

def explode():
    raise ValueError('user code exploded')

def unserializable():
    return {1, 2, 3}

def call_api(prompt, options, context):
    context['logger'].info('processing', {'prompt': prompt})
    return {'had_logger': 'logger' in context, 'output': prompt.upper()}

def echo_context(prompt, options, context):
    context['seen'] = True
    return context

def hook(config):
    return {
        'had_logger': 'logger' in config,
        'marker_gone': '__inject_logger__' not in config,
    }
";

    fn handler() -> (tempfile::TempDir, PythonCallHandler) {
        let (dir, path) = write_script(SCRIPT);
        (dir, PythonCallHandler::new(path))
    }

    #[tokio::test]
    async fn sync_function_scenario() {
        let (_dir, handler) = handler();
        let value = handler.call("add", vec![json!(2), json!(3)]).await.unwrap();
        assert_eq!(value, json!(5));
    }

    #[tokio::test]
    async fn coroutine_function_scenario() {
        let (_dir, handler) = handler();
        let value = handler.call("slow", vec![json!(21)]).await.unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn class_method_scenario() {
        let (_dir, handler) = handler();
        let value = handler.call("C.m", vec![json!(7)]).await.unwrap();
        assert_eq!(value, json!(7));
    }

    #[tokio::test]
    async fn script_loads_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = dir.path().join("loads.txt");
        let script = dir.path().join("user_script.py");
        std::fs::write(
            &script,
            format!(
                "with open({:?}, 'a') as f:\n    f.write('x')\n\ndef ping():\n    return 'pong'\n",
                sidecar.display().to_string()
            ),
        )
        .unwrap();

        let handler = PythonCallHandler::new(&script);
        handler.call("ping", vec![]).await.unwrap();
        handler.call("ping", vec![]).await.unwrap();
        handler.call("ping", vec![]).await.unwrap();

        // Top-level code ran on the first call only.
        assert_eq!(std::fs::read_to_string(&sidecar).unwrap(), "x");
    }

    #[tokio::test]
    async fn missing_function_reports_and_worker_recovers() {
        let (_dir, handler) = handler();

        let err = handler.call("missing_fn", vec![]).await.unwrap_err();
        assert!(matches!(err, CallError::Resolve { .. }));
        assert!(err.to_string().contains("missing_fn"));
        assert!(err.to_string().contains("add"));

        let value = handler.call("add", vec![json!(20), json!(22)]).await.unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn user_exception_becomes_invoke_error_with_traceback() {
        let (_dir, handler) = handler();

        let err = handler.call("explode", vec![]).await.unwrap_err();
        assert!(matches!(err, CallError::Invoke { .. }));
        assert!(err.to_string().contains("user code exploded"));
        assert!(
            err.traceback()
                .unwrap()
                .contains("ValueError: user code exploded")
        );
    }

    #[tokio::test]
    async fn unserializable_result_is_a_serialize_error() {
        let (_dir, handler) = handler();
        let err = handler.call("unserializable", vec![]).await.unwrap_err();
        assert!(matches!(err, CallError::Serialize { .. }));
    }

    #[tokio::test]
    async fn provider_call_gets_logger_in_context() {
        let (_dir, handler) = handler();
        let value = handler
            .call("call_api", vec![json!("hi"), json!({}), json!({})])
            .await
            .unwrap();
        assert_eq!(value, json!({"had_logger": true, "output": "HI"}));
    }

    #[tokio::test]
    async fn echoed_context_has_no_live_handle() {
        let (_dir, handler) = handler();
        let value = handler
            .call("echo_context", vec![json!("p"), json!({}), json!({})])
            .await
            .unwrap();
        // The injected handle was scrubbed before serialization.
        assert_eq!(value, json!({"seen": true}));
    }

    #[tokio::test]
    async fn hook_marker_is_replaced_by_logger() {
        let (_dir, handler) = handler();
        let value = handler
            .call("hook", vec![json!({"__inject_logger__": true})])
            .await
            .unwrap();
        assert_eq!(value, json!({"had_logger": true, "marker_gone": true}));
    }

    #[tokio::test]
    async fn two_argument_call_is_not_provider_shaped() {
        let (_dir, handler) = handler();
        // add(a, b) with two args must not grow a third logger argument.
        let value = handler.call("add", vec![json!(1), json!(2)]).await.unwrap();
        assert_eq!(value, json!(3));
    }
}
