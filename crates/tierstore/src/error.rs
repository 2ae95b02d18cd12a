//! Error types for tierstore

use std::fmt;
use std::io;

/// Result type alias for tierstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for disk cache operations
///
/// These never escape the public cache surface: [`crate::DiskCache`] logs them
/// and degrades the affected call to a miss or no-op.
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Malformed extended metadata sidecar
    Parse(String),

    /// Empty key
    InvalidKey,

    /// The I/O worker has shut down
    WorkerGone,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::InvalidKey => write!(f, "Invalid cache key"),
            Error::WorkerGone => write!(f, "Disk cache worker is not running"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}
