//! Session control loop.
//!
//! One worker process serves one session: commands are read line by line,
//! dispatched one at a time to completion, and answered with a response file
//! plus a `DONE` signal. Everything user code can do wrong is caught at the
//! dispatch boundary and returned as data; only protocol corruption or an
//! unwritable response file ends the process.

use std::io;
use std::path::Path;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, stdin, stdout};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::bridge::codec::{CommandCodec, lines_error};
use crate::bridge::protocol::{Command, DONE_SIGNAL, ErrorPayload};
use crate::payload;
use crate::sanitize;

/// Classified failure from one dispatch cycle.
///
/// All four kinds are recovered locally: they become [`ErrorPayload`]s in
/// the response file and the session keeps serving. Worker restart cost is
/// exactly what the persistent design amortizes away, so availability wins
/// over fail-fast here.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The user script file is missing, unreadable, or failed to execute.
    #[error("failed to load user script: {message}")]
    Load { message: String },

    /// The requested dotted name does not resolve to a callable.
    #[error("{message}")]
    Resolve { message: String },

    /// User code raised during the call.
    #[error("{message}")]
    Invoke {
        message: String,
        traceback: Option<String>,
    },

    /// The return value is not JSON-representable.
    #[error("result is not JSON-serializable: {message}")]
    Serialize { message: String },
}

impl CallError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    pub fn resolve(message: impl Into<String>) -> Self {
        Self::Resolve {
            message: message.into(),
        }
    }

    pub fn invoke(message: impl Into<String>, traceback: Option<String>) -> Self {
        Self::Invoke {
            message: message.into(),
            traceback,
        }
    }

    pub fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize {
            message: message.into(),
        }
    }

    pub fn traceback(&self) -> Option<&str> {
        match self {
            Self::Invoke { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }
}

/// Trait for the call dispatcher - abstracts the embedded interpreter.
#[async_trait::async_trait]
pub trait CallHandler: Send + Sync + 'static {
    /// Invoke `function` from the loaded user script with positional `args`.
    async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value, CallError>;
}

/// Run a session over arbitrary streams (stdin/stdout in production, an
/// in-memory duplex in tests).
///
/// Returns `Ok(())` on `SHUTDOWN` or when the host closes the channel;
/// returns an error on protocol corruption or an unwritable response file.
pub async fn run_session<H, R, W>(handler: Arc<H>, reader: R, writer: W) -> io::Result<()>
where
    H: CallHandler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut commands = FramedRead::new(reader, CommandCodec::new());
    let mut signals = FramedWrite::new(writer, LinesCodec::new());

    loop {
        match commands.next().await {
            Some(Ok(Command::Call {
                function,
                request,
                response,
            })) => {
                tracing::debug!(%function, request = %request.display(), "dispatching call");
                let value = dispatch(handler.as_ref(), &function, &request).await;

                // The response must be on disk before DONE goes out - the
                // host reads the file as soon as it sees the signal.
                if let Err(e) = payload::write_response(&response, &value).await {
                    tracing::error!(error = %e, "cannot write response file, exiting");
                    return Err(io::Error::other(e));
                }

                signals.send(DONE_SIGNAL).await.map_err(lines_error)?;
            }
            Some(Ok(Command::Shutdown)) => {
                tracing::info!("shutdown requested");
                break;
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "control channel corrupted");
                return Err(e);
            }
            None => {
                tracing::info!("control channel closed (host gone), exiting");
                break;
            }
        }
    }

    Ok(())
}

/// Run a session over the process's stdin/stdout.
pub async fn run_worker<H: CallHandler>(handler: Arc<H>) -> io::Result<()> {
    run_session(handler, stdin(), stdout()).await
}

/// One dispatch cycle: read arguments, call, sanitize or serialize the
/// failure. Never propagates user-level errors - the returned value is
/// always ready for the response file.
async fn dispatch<H: CallHandler>(handler: &H, function: &str, request: &Path) -> Value {
    let args = match payload::read_request(request).await {
        Ok(args) => args,
        Err(e) => {
            tracing::warn!(error = %e, "request payload unusable");
            return ErrorPayload::new(e.to_string(), None).into_value();
        }
    };

    match handler.call(function, args).await {
        Ok(mut value) => {
            sanitize::strip_runtime_keys(&mut value);
            value
        }
        Err(e) => {
            tracing::debug!(%function, error = %e, "call failed");
            ErrorPayload::from(&e).into_value()
        }
    }
}
