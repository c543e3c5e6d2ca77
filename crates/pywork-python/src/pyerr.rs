//! PyErr rendering for structured error payloads.

use pyo3::prelude::*;

use pywork::CallError;

/// Formatted traceback text, with the exception line appended the way
/// Python's `traceback.format_exc()` renders it. `None` when the error
/// carries no traceback (e.g. raised from C before any frame ran).
pub fn traceback_text(py: Python<'_>, err: &PyErr) -> Option<String> {
    let tb = err.traceback(py)?;
    let formatted = tb.format().ok()?;
    Some(format!("{formatted}{err}"))
}

/// User code raised during a call: message plus traceback, non-fatal.
pub fn invoke_error(py: Python<'_>, err: &PyErr) -> CallError {
    CallError::invoke(err.to_string(), traceback_text(py, err))
}

/// Render an error with its traceback inline, for error kinds whose payload
/// has no separate traceback field (script load failures).
pub fn message_with_traceback(py: Python<'_>, err: &PyErr) -> String {
    match traceback_text(py, err) {
        Some(tb) => tb,
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_error_carries_traceback() {
        Python::attach(|py| {
            let err = py
                .run(c"raise ValueError('boom')", None, None)
                .unwrap_err();
            let call_err = invoke_error(py, &err);

            assert!(call_err.to_string().contains("boom"));
            let tb = call_err.traceback().unwrap();
            assert!(tb.starts_with("Traceback (most recent call last):"));
            assert!(tb.contains("ValueError: boom"));
        });
    }
}
