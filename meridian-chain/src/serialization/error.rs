use std::io;

use thiserror::Error;

/// A serialization error.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// An io error that prevented deserialization
    #[error("io error: {0}")]
    Io(io::Error),
    /// The byte stream ended before the value was complete.
    #[error("unexpected end of input")]
    Truncated,
    /// A length prefix exceeded the per-message sanity cap.
    #[error("array length {len} exceeds sanity cap {max}")]
    OversizedArray { len: u64, max: u64 },
    /// The data to be deserialized was malformed.
    #[error("parse error: {0}")]
    Parse(&'static str),
}

impl From<io::Error> for SerializationError {
    fn from(e: io::Error) -> Self {
        // Short reads surface as a typed error so callers can distinguish
        // a truncated message from a genuine transport failure.
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SerializationError::Truncated
        } else {
            SerializationError::Io(e)
        }
    }
}
