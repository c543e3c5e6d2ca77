//! Dotted-name resolution against the loaded user module.
//!
//! `"call_api"` resolves a top-level function; `"Provider.call_api"` walks
//! one attribute deeper, instantiating a class on the way so methods arrive
//! bound. Resolution is recomputed on every call - attribute lookup is cheap
//! next to the call itself, and per-call instances keep method dispatch free
//! of hidden cross-call state.

use pyo3::prelude::*;
use pyo3::types::{PyModule, PyType};

use pywork::CallError;

/// How the resolved target binds to the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    /// A module-level function (or any directly callable attribute).
    Function,
    /// A method reached through a class or object attribute.
    BoundMethod,
}

/// A transient invocable handle, valid for one dispatch cycle.
#[derive(Debug)]
pub struct ResolvedCallable<'py> {
    pub target: Bound<'py, PyAny>,
    pub kind: CallableKind,
}

/// Resolve `name` against `module`, failing closed with a message that
/// lists what is actually available so typos self-diagnose.
pub fn resolve<'py>(
    module: &Bound<'py, PyModule>,
    name: &str,
) -> Result<ResolvedCallable<'py>, CallError> {
    let mut segments = name.split('.');

    let first = match segments.next() {
        Some(seg) if !seg.is_empty() => seg,
        _ => return Err(CallError::resolve(format!("empty function name: {name:?}"))),
    };

    let mut target = module
        .getattr(first)
        .map_err(|_| unknown_name(module.as_any(), name, first, "user script"))?;
    let mut kind = CallableKind::Function;
    let mut scope_name = first.to_string();

    for segment in segments {
        if segment.is_empty() {
            return Err(CallError::resolve(format!(
                "malformed dotted name: {name:?}"
            )));
        }

        // Methods resolve against a fresh zero-argument instance so they
        // arrive bound rather than expecting an explicit self.
        if target.is_instance_of::<PyType>() {
            target = target.call0().map_err(|e| {
                CallError::resolve(format!(
                    "failed to instantiate '{scope_name}' while resolving '{name}': {e}"
                ))
            })?;
        }

        target = target
            .getattr(segment)
            .map_err(|_| unknown_name(&target, name, segment, &scope_name))?;
        kind = CallableKind::BoundMethod;
        scope_name = format!("{scope_name}.{segment}");
    }

    if !target.is_callable() {
        return Err(CallError::resolve(format!("'{name}' is not callable")));
    }

    Ok(ResolvedCallable { target, kind })
}

fn unknown_name(
    scope: &Bound<'_, PyAny>,
    requested: &str,
    segment: &str,
    scope_name: &str,
) -> CallError {
    CallError::resolve(format!(
        "function '{requested}' not found: no attribute '{segment}' on {scope_name}; \
         available names: {}",
        public_names(scope)
    ))
}

fn public_names(obj: &Bound<'_, PyAny>) -> String {
    let names: Vec<String> = obj
        .dir()
        .map(|dir| {
            dir.iter()
                .filter_map(|name| name.extract::<String>().ok())
                .filter(|name| !name.starts_with('_'))
                .collect()
        })
        .unwrap_or_default();

    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}
