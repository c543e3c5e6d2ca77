//! Structured log bridge to the host.
//!
//! User code logs through the injected handle; every call becomes one JSON
//! line on stderr tagged with a fixed marker, flushed immediately. The
//! marker is how the host tells structured logs apart from arbitrary stderr
//! noise (tracebacks, stray prints). Levels are advisory tags only - the
//! worker never filters, that is the host's job.

use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker the host greps for on the worker's stderr.
pub const LOG_MARKER: &str = "__PROMPTFOO_LOG__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log record. Ephemeral - serialized to stderr and never
/// persisted worker-side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    marker: &'static str,
    level: LogLevel,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            marker: LOG_MARKER,
            level,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Serialize and emit one record as a single stderr line, flushed.
///
/// `serde_json` escapes embedded newlines, so the single-line guarantee
/// holds for any message or data content.
pub fn emit(record: &LogRecord) {
    match serde_json::to_string(record) {
        Ok(line) => {
            let stderr = std::io::stderr();
            let mut handle = stderr.lock();
            let _ = writeln!(handle, "{line}");
            let _ = handle.flush();
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping unserializable log record");
        }
    }
}

/// Convenience wrapper: build and emit in one call.
pub fn log(level: LogLevel, message: &str, data: Option<Value>) {
    let mut record = LogRecord::new(level, message);
    if let Some(data) = data {
        record = record.with_data(data);
    }
    emit(&record);
}
