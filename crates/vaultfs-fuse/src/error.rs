//! Error handling and mapping for the FUSE filesystem.
//!
//! Node-layer failures become [`FuseError`]s and reach the kernel as POSIX
//! error codes through [`FuseError::to_errno`]. Absence and store failure
//! are kept apart: only an explicit "key absent" answer from the store is
//! reported as `ENOENT`, everything else the store raises is `EIO`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vaultfs_core::StoreError;

/// Errors raised while answering a kernel request.
#[derive(Debug, Error)]
pub enum FuseError {
    /// The store has nothing at this path.
    #[error("No such entry: {0}")]
    NotFound(String),

    /// The store failed (unreachable, denied, malformed response).
    #[error("Store operation on {path} failed: {source}")]
    Store {
        /// Store path being resolved.
        path: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A directory operation on a leaf.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A file operation on a directory.
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// Any attempt to modify the filesystem.
    #[error("Read-only filesystem")]
    ReadOnly,

    /// An inode the kernel never received from a lookup, or one already forgotten.
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// A name that cannot be a store key.
    #[error("Invalid name")]
    InvalidName,
}

impl FuseError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            FuseError::NotFound(_) | FuseError::InvalidInode(_) | FuseError::InvalidName => {
                libc::ENOENT
            }
            FuseError::Store { .. } => libc::EIO,
            FuseError::NotADirectory(_) => libc::ENOTDIR,
            FuseError::IsADirectory(_) => libc::EISDIR,
            FuseError::ReadOnly => libc::EROFS,
        }
    }
}

/// Result type for FUSE operations.
pub type FuseResult<T> = Result<T, FuseError>;

/// Errors raised by a [`MountSession`](crate::MountSession).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The kernel refused to bind the mountpoint.
    #[error("Failed to mount {}: {source}", .mountpoint.display())]
    Bind {
        /// Mountpoint path.
        mountpoint: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The serve loop stopped with an error.
    #[error("FUSE session at {} failed: {source}", .mountpoint.display())]
    Serve {
        /// Mountpoint path.
        mountpoint: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The serve loop thread panicked.
    #[error("FUSE session thread at {} panicked", .mountpoint.display())]
    Panicked {
        /// Mountpoint path.
        mountpoint: PathBuf,
    },

    /// The kernel refused to release the mountpoint.
    #[error("Failed to unmount {}: {source}", .mountpoint.display())]
    Unmount {
        /// Mountpoint path.
        mountpoint: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    /// Copy for the error stream, since `io::Error` is not `Clone`.
    pub(crate) fn duplicate(&self) -> Self {
        fn copy(e: &io::Error) -> io::Error {
            match e.raw_os_error() {
                Some(code) => io::Error::from_raw_os_error(code),
                None => io::Error::new(e.kind(), e.to_string()),
            }
        }
        match self {
            SessionError::Bind { mountpoint, source } => SessionError::Bind {
                mountpoint: mountpoint.clone(),
                source: copy(source),
            },
            SessionError::Serve { mountpoint, source } => SessionError::Serve {
                mountpoint: mountpoint.clone(),
                source: copy(source),
            },
            SessionError::Panicked { mountpoint } => SessionError::Panicked {
                mountpoint: mountpoint.clone(),
            },
            SessionError::Unmount { mountpoint, source } => SessionError::Unmount {
                mountpoint: mountpoint.clone(),
                source: copy(source),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FuseError::NotFound("a".into()).to_errno(), libc::ENOENT);
        assert_eq!(FuseError::InvalidInode(7).to_errno(), libc::ENOENT);
        assert_eq!(FuseError::NotADirectory("a".into()).to_errno(), libc::ENOTDIR);
        assert_eq!(FuseError::IsADirectory("a".into()).to_errno(), libc::EISDIR);
        assert_eq!(FuseError::ReadOnly.to_errno(), libc::EROFS);
    }

    #[test]
    fn test_store_failure_is_eio() {
        let e = FuseError::Store {
            path: "secret/a".into(),
            source: StoreError::Unavailable("connection refused".into()),
        };
        assert_eq!(e.to_errno(), libc::EIO);
    }

    #[test]
    fn test_duplicate_keeps_os_error() {
        let e = SessionError::Bind {
            mountpoint: PathBuf::from("/mnt/x"),
            source: io::Error::from_raw_os_error(libc::EACCES),
        };
        match e.duplicate() {
            SessionError::Bind { source, .. } => {
                assert_eq!(source.raw_os_error(), Some(libc::EACCES));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
