//! JSON ⇄ Python conversion.
//!
//! Goes through Python's own `json` module rather than a hand-rolled value
//! mapping, so what user code receives is exactly what `json.loads` of the
//! payload file would produce, and results round-trip the way user code
//! would serialize them itself.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde_json::Value;

pub fn json_to_py<'py>(py: Python<'py>, value: &Value) -> PyResult<Bound<'py, PyAny>> {
    let json = py.import("json")?;
    let text =
        serde_json::to_string(value).map_err(|e| PyValueError::new_err(e.to_string()))?;
    json.call_method1("loads", (text,))
}

/// Strict conversion: raises (TypeError from `json.dumps`) when `obj` is not
/// JSON-representable. Used for call results, where that failure must be
/// reported as a distinct serialization error rather than truncated data.
pub fn py_to_json(py: Python<'_>, obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    let json = py.import("json")?;
    let text: String = json.call_method1("dumps", (obj,))?.extract()?;
    serde_json::from_str(&text).map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Lenient conversion for log data: `json.dumps(obj, default=str)`, so
/// arbitrary user objects are loggable without raising.
pub fn py_to_json_lenient(py: Python<'_>, obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    let json = py.import("json")?;
    let builtins = py.import("builtins")?;
    let kwargs = PyDict::new(py);
    kwargs.set_item("default", builtins.getattr("str")?)?;
    let text: String = json
        .call_method("dumps", (obj,), Some(&kwargs))?
        .extract()?;
    serde_json::from_str(&text).map_err(|e| PyValueError::new_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trips_through_python() {
        Python::attach(|py| {
            let value = json!({"a": [1, 2.5, "x", null, true], "b": {"c": {}}});
            let obj = json_to_py(py, &value).unwrap();
            assert_eq!(py_to_json(py, &obj).unwrap(), value);
        });
    }

    #[test]
    fn unserializable_object_raises() {
        Python::attach(|py| {
            let obj = py.eval(c"{1, 2, 3}", None, None).unwrap();
            assert!(py_to_json(py, &obj).is_err());
        });
    }

    #[test]
    fn lenient_conversion_coerces_via_str() {
        Python::attach(|py| {
            let obj = py
                .eval(c"{'path': __import__('pathlib').Path('/tmp/x')}", None, None)
                .unwrap();
            let value = py_to_json_lenient(py, &obj).unwrap();
            assert_eq!(value["path"], json!("/tmp/x"));
        });
    }
}
