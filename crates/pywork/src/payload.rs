//! Request and response payload files.
//!
//! The host writes a request file (a JSON array of positional arguments)
//! before sending a `CALL` line; the worker writes the response file before
//! emitting `DONE`. The worker never deletes either - payload lifetime
//! belongs to the host.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("failed to read request file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("request file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("request file {path} must contain a JSON array of arguments")]
    NotAnArray { path: PathBuf },

    #[error("failed to write response file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read and parse one request payload: a UTF-8 JSON array of positional
/// arguments.
pub async fn read_request(path: &Path) -> Result<Vec<Value>, PayloadError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| PayloadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = serde_json::from_slice(&bytes).map_err(|source| PayloadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Array(args) => Ok(args),
        _ => Err(PayloadError::NotAnArray {
            path: path.to_path_buf(),
        }),
    }
}

/// Serialize `value` and write it as the response payload.
pub async fn write_response(path: &Path, value: &Value) -> Result<(), PayloadError> {
    // serde_json can only fail here on non-string map keys, which Value
    // cannot represent, so the write is the lone failure point.
    let bytes = serde_json::to_vec(value).map_err(|e| PayloadError::Write {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })?;

    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| PayloadError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reads_argument_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, r#"[2, 3, {"opts": true}]"#).unwrap();

        let args = read_request(&path).await.unwrap();
        assert_eq!(args, vec![json!(2), json!(3), json!({"opts": true})]);
    }

    #[tokio::test]
    async fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_request(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, PayloadError::Read { .. }));
    }

    #[tokio::test]
    async fn invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, "not json").unwrap();

        let err = read_request(&path).await.unwrap_err();
        assert!(matches!(err, PayloadError::Parse { .. }));
    }

    #[tokio::test]
    async fn non_array_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, r#"{"a": 1}"#).unwrap();

        let err = read_request(&path).await.unwrap_err();
        assert!(matches!(err, PayloadError::NotAnArray { .. }));
    }

    #[tokio::test]
    async fn response_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resp.json");

        write_response(&path, &json!({"output": [1, 2, 3]}))
            .await
            .unwrap();

        let written: Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"output": [1, 2, 3]}));
    }

    #[tokio::test]
    async fn write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("resp.json");

        let err = write_response(&path, &json!(null)).await.unwrap_err();
        assert!(matches!(err, PayloadError::Write { .. }));
    }
}
