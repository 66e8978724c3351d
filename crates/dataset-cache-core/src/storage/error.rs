//! Errors raised by cache directory IO.

use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// Backend-specific failure underneath a [`StorageError`].
#[derive(Debug)]
pub enum BackendError {
    /// Local filesystem failure.
    Local(io::Error),
}

impl BackendError {
    /// Kind of the underlying I/O error.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            BackendError::Local(e) => e.kind(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local filesystem: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors raised while reading or writing the cache directory.
///
/// Paths are absolute, as resolved against the cache location.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// A file expected in the cache directory is missing.
    #[snafu(display("Missing cache file {path}"))]
    NotFound {
        /// Missing path.
        path: String,
        /// Backend error reporting the missing file.
        source: BackendError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Any other I/O failure on a cache path.
    #[snafu(display("I/O error on cache path {path}: {source}"))]
    OtherIo {
        /// Path being accessed.
        path: String,
        /// Underlying backend error.
        source: BackendError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// Path the failed operation was accessing.
    pub fn path(&self) -> &str {
        match self {
            StorageError::NotFound { path, .. } | StorageError::OtherIo { path, .. } => path,
        }
    }
}
