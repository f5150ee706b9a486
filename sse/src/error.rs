//! Error types for SSE event channels.

use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by the producer side of an [`EventChannel`](crate::EventChannel).
///
/// None of these are transient. A handler that hits one has a logic bug
/// (sending after close, building an invalid frame) and retrying will not help.
#[derive(Debug)]
pub enum Error {
    /// The channel was already closed when `send` was called. This is the
    /// equivalent of writing to a pipe whose reader has gone away.
    BrokenChannel,

    /// The event name contains a line break and would corrupt the frame.
    InvalidEventName(String),

    /// A structured payload could not be serialized to JSON.
    Serialization(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BrokenChannel => write!(f, "Broken channel: event stream is closed"),
            Error::InvalidEventName(name) => {
                write!(f, "Invalid event name: {:?} contains a line break", name)
            }
            Error::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}
