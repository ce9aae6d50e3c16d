//! Error types for mtpx_core.

use crate::store::{Handle, StoreError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using mtpx_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, walking or transferring objects.
#[derive(Error, Debug)]
pub enum Error {
    /// Path is malformed, empty or structurally impossible.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A named child does not exist under a known parent.
    #[error("File not found: {name:?} under {parent}")]
    NotFound { parent: Handle, name: String },

    /// Listing, metadata or property round trip failed.
    #[error("Object access failed for {handle}: {source}")]
    ObjectAccess {
        handle: Handle,
        #[source]
        source: StoreError,
    },

    /// Object creation or byte upload failed.
    #[error("Sending object {name:?} failed: {source}")]
    Send {
        name: String,
        #[source]
        source: StoreError,
    },

    /// Local filesystem permission denied.
    #[error("Permission denied: {}", .path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other local filesystem failure.
    #[error("Local file error at {}: {source}", .path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unexpected failure in the middle of a walk-and-transfer.
    #[error("Transfer failed: {reason}")]
    Transfer {
        reason: String,
        #[source]
        source: Box<Error>,
    },

    /// The device exposes no storage.
    #[error("No storage found on device")]
    NoStorage,

    /// Configuration could not be parsed.
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(parent: Handle, name: impl Into<String>) -> Self {
        Error::NotFound {
            parent,
            name: name.into(),
        }
    }

    /// Create an ObjectAccess error.
    pub fn object_access(handle: Handle, source: StoreError) -> Self {
        Error::ObjectAccess { handle, source }
    }

    /// Create a Send error.
    pub fn send(name: impl Into<String>, source: StoreError) -> Self {
        Error::Send {
            name: name.into(),
            source,
        }
    }

    /// Classify a local I/O failure.
    ///
    /// Permission problems map to [`Error::Permission`], missing paths to
    /// [`Error::InvalidPath`] and everything else to [`Error::LocalFile`].
    pub fn local(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Error::Permission { path, source },
            io::ErrorKind::NotFound => Error::InvalidPath {
                path: path.display().to_string(),
                reason: source.to_string(),
            },
            _ => Error::LocalFile { path, source },
        }
    }

    /// Wrap an unexpected error into a Transfer error.
    pub fn transfer(reason: impl Into<String>, source: Error) -> Self {
        Error::Transfer {
            reason: reason.into(),
            source: Box::new(source),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns true for [`Error::InvalidPath`].
    pub fn is_invalid_path(&self) -> bool {
        matches!(self, Error::InvalidPath { .. })
    }

    /// Returns true for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns true for errors that originate in the local environment
    /// rather than in the data being transferred.
    pub fn is_local(&self) -> bool {
        matches!(self, Error::Permission { .. } | Error::LocalFile { .. })
    }

    /// Promote a not-found into an invalid-path for `path`, leaving every
    /// other error untouched.
    pub(crate) fn into_invalid_path(self, path: &str) -> Self {
        match self {
            Error::NotFound { name, .. } => {
                Error::invalid_path(path, format!("path not found, missing {:?}", name))
            }
            other => other,
        }
    }
}

/// Converts ignore walker errors into local file errors.
impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        let path = walk_error_path(&err).unwrap_or_default();
        match err.io_error() {
            Some(io_err) => Error::local(path, io::Error::new(io_err.kind(), io_err.to_string())),
            None => Error::LocalFile {
                path,
                source: io::Error::other(err.to_string()),
            },
        }
    }
}

/// Dig the offending path out of a (possibly nested) walker error.
fn walk_error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        ignore::Error::Partial(errs) => errs.iter().find_map(walk_error_path),
        _ => None,
    }
}
