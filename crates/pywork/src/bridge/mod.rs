//! Control-channel wire format for host-worker communication.
//!
//! - **protocol**: command lines, the completion signal, the structured
//!   error payload
//! - **codec**: line framing over any `AsyncRead`

pub mod codec;
pub mod protocol;
