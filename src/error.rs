//! Filesystem adapter errors
//!
//! Remote failures are carried unchanged in [`FsError::Remote`]; the other
//! variants are the filesystem contract's own error kinds.

use std::io;

use crate::dropbox::DropboxError;

/// Errors returned by `DropboxFs` operations
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error(transparent)]
    Remote(#[from] DropboxError),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Local I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Map to a libc errno
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::Remote(e) => e.to_errno(),
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::InvalidPath(_) | FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Whether the path does not exist remotely
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::Remote(DropboxError::NotFound(_)))
    }
}

impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        let kind = match &e {
            FsError::Io(inner) => inner.kind(),
            FsError::Remote(DropboxError::NotFound(_)) => io::ErrorKind::NotFound,
            FsError::Remote(DropboxError::Forbidden(_))
            | FsError::Remote(DropboxError::AuthExpired(_)) => io::ErrorKind::PermissionDenied,
            FsError::Remote(DropboxError::Conflict(_)) => io::ErrorKind::AlreadyExists,
            FsError::Remote(DropboxError::Timeout) => io::ErrorKind::TimedOut,
            FsError::InvalidPath(_) | FsError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}
