//! Error types for the `sse` crate.
//!
//! Follows the same pattern as the other layers: a root `Error` struct holding
//! an `error_kind` plus the optional underlying cause.
use std::error::Error as StdError;
use std::fmt;
use std::io;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Categories of failure for one SSE connection.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The response sink cannot flush incrementally, nothing was written.
    StreamingUnsupported,
    /// A field carried a line break, nothing was written.
    InvalidField(Field),
    /// The transport failed mid-stream; the client is most likely gone.
    Write,
    Other(String),
}

/// Single-line fields of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Event,
    Comment,
}

impl Error {
    pub fn streaming_unsupported() -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::StreamingUnsupported,
        }
    }

    pub fn invalid_field(field: Field) -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::InvalidField(field),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::Other(message.into()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Field::Id => write!(f, "id"),
            Field::Event => write!(f, "event"),
            Field::Comment => write!(f, "comment"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::StreamingUnsupported => write!(f, "Streaming unsupported"),
            ErrorKind::InvalidField(field) => write!(f, "SSE {field} contains a line break"),
            ErrorKind::Write => match &self.source {
                Some(source) => write!(f, "SSE write failed: {source}"),
                None => write!(f, "SSE write failed"),
            },
            ErrorKind::Other(message) => write!(f, "SSE Error: {message}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Write,
        }
    }
}
