//! Invocation engine.
//!
//! Plain targets are called directly with the positional tuple. Coroutine
//! targets are detected statically (never by calling first - calling has
//! side effects) and driven to completion by `asyncio.run`, which creates a
//! fresh event loop scoped to that single call and tears it down afterwards.
//! No loop object survives across commands, so pending callbacks and
//! cancelled-task state cannot leak between unrelated calls.

use pyo3::prelude::*;
use pyo3::types::PyTuple;

use crate::resolver::ResolvedCallable;

/// Static coroutine-function check via `inspect.iscoroutinefunction`.
pub fn is_coroutine_function(py: Python<'_>, target: &Bound<'_, PyAny>) -> PyResult<bool> {
    let inspect = py.import("inspect")?;
    inspect
        .call_method1("iscoroutinefunction", (target,))?
        .extract()
}

/// Call the resolved target with positional arguments.
///
/// Arity mismatches surface as the interpreter's own `TypeError`. A user
/// function that starts another event loop while inside the one created
/// here fails with the interpreter's nested-loop error; that is reported,
/// not handled.
pub fn invoke<'py>(
    py: Python<'py>,
    resolved: &ResolvedCallable<'py>,
    args: Bound<'py, PyTuple>,
) -> PyResult<Bound<'py, PyAny>> {
    let is_coro = is_coroutine_function(py, &resolved.target)?;
    let result = resolved.target.call1(args)?;

    if is_coro {
        let asyncio = py.import("asyncio")?;
        asyncio.call_method1("run", (result,))
    } else {
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use crate::script::LoadedScript;
    use crate::testutil::write_script;

    const SCRIPT: &str = "\
import asyncio

def add(a, b):
    return a + b

def probe_loop():
    try:
        asyncio.get_running_loop()
        return True
    except RuntimeError:
        return False

async def slow(x):
    await asyncio.sleep(0.01)
    return x * 2

CALLS = 0

async def counting():
    global CALLS
    CALLS += 1
    return CALLS
";

    fn with_script<F: FnOnce(Python<'_>, &LoadedScript)>(f: F) {
        let (_dir, path) = write_script(SCRIPT);
        Python::attach(|py| {
            let script = LoadedScript::load(py, &path).unwrap();
            f(py, &script);
        });
    }

    #[test]
    fn sync_target_returns_directly() {
        with_script(|py, script| {
            let resolved = resolve(&script.module(py), "add").unwrap();
            let args = PyTuple::new(py, [2, 3]).unwrap();
            let result: i64 = invoke(py, &resolved, args).unwrap().extract().unwrap();
            assert_eq!(result, 5);
        });
    }

    #[test]
    fn sync_target_sees_no_event_loop() {
        with_script(|py, script| {
            let resolved = resolve(&script.module(py), "probe_loop").unwrap();
            let args = PyTuple::empty(py);
            let saw_loop: bool = invoke(py, &resolved, args).unwrap().extract().unwrap();
            assert!(!saw_loop);
        });
    }

    #[test]
    fn coroutine_target_is_driven_to_completion() {
        with_script(|py, script| {
            let resolved = resolve(&script.module(py), "slow").unwrap();
            let args = PyTuple::new(py, [21]).unwrap();
            let result: i64 = invoke(py, &resolved, args).unwrap().extract().unwrap();
            assert_eq!(result, 42);
        });
    }

    #[test]
    fn detection_is_static_not_call_based() {
        with_script(|py, script| {
            let resolved = resolve(&script.module(py), "counting").unwrap();
            assert!(is_coroutine_function(py, &resolved.target).unwrap());

            // Detection alone ran nothing.
            let calls: i64 = script
                .module(py)
                .getattr("CALLS")
                .unwrap()
                .extract()
                .unwrap();
            assert_eq!(calls, 0);
        });
    }

    #[test]
    fn arity_mismatch_is_a_type_error() {
        with_script(|py, script| {
            let resolved = resolve(&script.module(py), "add").unwrap();
            let args = PyTuple::new(py, [1]).unwrap();
            let err = invoke(py, &resolved, args).unwrap_err();
            assert!(err.is_instance_of::<pyo3::exceptions::PyTypeError>(py));
        });
    }
}
