//! Filesystem error types.

use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Filesystem error type.
///
/// Every driver operation reports failure through one of these kinds;
/// nothing in the contract panics. The dispatch layer maps them onto the
/// conventional OS-level error codes.
#[derive(Debug, Error)]
pub enum FsError {
    /// A path segment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Create would duplicate a sibling name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Remove on a directory that still has children.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Operation not valid for this backend or node kind.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Instance busy: open handles remain, or the instance lock timed out.
    /// Transient; callers may retry.
    #[error("busy: {0}")]
    Busy(String),

    /// Malformed path, bad flag combination, zero count, or stale descriptor.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failure during create, rename, or write growth.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a NotSupported error.
    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }

    /// Create a Busy error.
    pub fn busy(what: impl Into<String>) -> Self {
        Self::Busy(what.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    /// Returns true if this error is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Fallible collection growth surfaces as an allocation failure.
impl From<TryReserveError> for FsError {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory("allocation failure".into())
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            FsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            FsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            FsError::NotSupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            FsError::Busy(msg) => io::Error::new(io::ErrorKind::ResourceBusy, msg),
            FsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::OutOfMemory(msg) => io::Error::new(io::ErrorKind::OutOfMemory, msg),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
