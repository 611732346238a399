//! Error types for the exhash index engine.

use std::fmt;
use std::io;

/// The result type used throughout exhash.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for index and block-store operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error surfaced by the block store.
    Io(io::Error),

    /// On-disk block contents violate the index layout.
    Corruption(String),

    /// An invalid argument was provided.
    InvalidArgument(String),

    /// An operation was attempted on a descriptor or file that is not open,
    /// or a close was attempted twice.
    InvalidState(String),

    /// A fixed capacity is exhausted: the open-descriptor table, the
    /// single-block directory, a bucket after its one split, or a cache
    /// with every frame pinned.
    ResourceExhausted(String),

    /// The index file already exists.
    AlreadyExists(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a new resource exhausted error.
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Error::ResourceExhausted(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Corruption(msg) => write!(f, "Data corruption: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::ResourceExhausted(msg) => write!(f, "Resource exhausted: {}", msg),
            Error::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
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
