//! pywork-python: embedded-Python call handler for the pywork runtime.
//!
//! Owns everything that touches the interpreter: loading the user script,
//! resolving dotted names, driving sync and coroutine targets, and the
//! logger handle injected into provider/hook arguments. All interpreter
//! access happens under `Python::attach` on the blocking thread pool.

mod convert;
mod handler;
mod invoke;
mod logger;
mod pyerr;
mod resolver;
mod script;

pub use handler::PythonCallHandler;
pub use logger::WorkerLogger;
