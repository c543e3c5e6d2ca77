//! Wire protocol for the control channel.
//!
//! Host → worker, one command per line on stdin:
//!
//! ```text
//! CALL|<function_name>|<request_file>|<response_file>
//! SHUTDOWN
//! ```
//!
//! Worker → host: the line `DONE` on stdout once a response file is fully
//! written. Fields are pipe-delimited; Windows drive letters put `:` inside
//! paths, so colons cannot separate fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::CallError;

/// Completion signal emitted on stdout after each dispatch cycle.
pub const DONE_SIGNAL: &str = "DONE";

/// A single parsed command line.
///
/// Commands are ephemeral - one exists only for the duration of one dispatch
/// cycle, and no two are ever in flight at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Invoke `function` from the loaded user script. Arguments are read
    /// from `request`, the result (or error payload) is written to
    /// `response`.
    Call {
        function: String,
        request: PathBuf,
        response: PathBuf,
    },
    /// Terminate the session cleanly.
    Shutdown,
}

/// Command-line corruption. Fatal: the loop cannot guess the intended
/// operation, so the worker exits nonzero instead of continuing.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown operation in command line: {0:?}")]
    UnknownOperation(String),

    #[error("malformed command line (expected CALL|<fn>|<request>|<response>): {0:?}")]
    Malformed(String),
}

impl Command {
    /// Parse one line of the control protocol.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line == "SHUTDOWN" {
            return Ok(Self::Shutdown);
        }

        let mut fields = line.split('|');
        match fields.next() {
            Some("CALL") => {}
            Some("SHUTDOWN") => {
                // SHUTDOWN takes no operands.
                return Err(ProtocolError::Malformed(line.to_string()));
            }
            _ => return Err(ProtocolError::UnknownOperation(line.to_string())),
        }

        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(function), Some(request), Some(response), None)
                if !function.is_empty() && !request.is_empty() && !response.is_empty() =>
            {
                Ok(Self::Call {
                    function: function.to_string(),
                    request: PathBuf::from(request),
                    response: PathBuf::from(response),
                })
            }
            _ => Err(ProtocolError::Malformed(line.to_string())),
        }
    }
}

/// Structured error object written to a response file in place of a result.
///
/// From the host's perspective a failed call is shape-identical to a
/// successful one - a file is written and `DONE` is emitted - so the host
/// distinguishes failure by the `error` field, not by the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl ErrorPayload {
    pub fn new(error: impl Into<String>, traceback: Option<String>) -> Self {
        Self {
            error: error.into(),
            traceback,
        }
    }

    /// Build the JSON value for the response file. Infallible by
    /// construction - no serializer round-trip involved.
    pub fn into_value(self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("error".to_string(), Value::String(self.error));
        if let Some(tb) = self.traceback {
            map.insert("traceback".to_string(), Value::String(tb));
        }
        Value::Object(map)
    }
}

impl From<&CallError> for ErrorPayload {
    fn from(err: &CallError) -> Self {
        Self::new(err.to_string(), err.traceback().map(str::to_string))
    }
}
