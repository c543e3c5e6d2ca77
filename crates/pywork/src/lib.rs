//! pywork: persistent worker runtime for promptfoo Python providers.
//!
//! A host process spawns one worker per user script and drives it through a
//! line-delimited control protocol on stdin/stdout, with call payloads
//! exchanged via files. This crate owns the protocol, the payload I/O, the
//! structured-log bridge, the context sanitizer, and the session loop; the
//! embedded interpreter lives behind the [`CallHandler`] trait.

pub mod bridge;
pub mod logger;
pub mod payload;
pub mod sanitize;
pub mod session;

pub use bridge::protocol::{Command, DONE_SIGNAL, ErrorPayload, ProtocolError};
pub use logger::{LOG_MARKER, LogLevel, LogRecord};
pub use payload::PayloadError;
pub use sanitize::{InjectionPlan, plan_injection, strip_runtime_keys};
pub use session::{CallError, CallHandler, run_session, run_worker};
