//! Line codec for the control channel.
//!
//! Wraps `LinesCodec` and parses each complete line into a [`Command`].
//! Works over any `AsyncRead` (stdin in production, an in-memory duplex in
//! tests).

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use super::protocol::Command;

/// Decodes pipe-delimited command lines into [`Command`]s.
///
/// Blank lines are skipped. A line that fails to parse becomes
/// `io::ErrorKind::InvalidData`, which the session loop treats as fatal
/// protocol corruption.
pub struct CommandCodec {
    inner: LinesCodec,
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandCodec {
    pub fn new() -> Self {
        Self {
            inner: LinesCodec::new(),
        }
    }
}

pub(crate) fn lines_error(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "command line too long")
        }
    }
}

impl Decoder for CommandCodec {
    type Item = Command;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(line) = self.inner.decode(src).map_err(lines_error)? {
            if line.trim().is_empty() {
                continue;
            }
            let command = Command::parse(&line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            return Ok(Some(command));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(line) = self.inner.decode_eof(src).map_err(lines_error)? {
            if line.trim().is_empty() {
                continue;
            }
            let command = Command::parse(&line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            return Ok(Some(command));
        }
        Ok(None)
    }
}
