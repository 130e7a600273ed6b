//! Error types for config store operations

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which backing store produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The live coordination service
    Coordination,
    /// A local file-backed store (backup or session record)
    LocalFile,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordination => write!(f, "zookeeper"),
            Self::LocalFile => write!(f, "local config file"),
        }
    }
}

/// Errors surfaced to callers of stores, sessions and the resolver
#[derive(Error, Debug)]
pub enum StoreError {
    /// Key absent in the backend; callers treat this as "no such key"
    #[error("{key} not found in {backend} {location}")]
    KeyNotFound {
        backend: BackendKind,
        key: String,
        /// Backing file path or coordination hosts
        location: String,
    },

    /// Unrecognized or malformed serialization format
    #[error("Format error: {message}")]
    Format { message: String },

    /// `fetch` was given something it cannot resolve
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// File I/O error outside of best-effort persistence
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unexpected coordination-service failure that must not be masked
    #[error("Coordination service error: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// Returns `true` if this error means the key is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }
}
