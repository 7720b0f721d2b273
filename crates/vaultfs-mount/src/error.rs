//! Error types for volume lifecycle operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`VolumeManager`](crate::VolumeManager) operations
/// and [`MountBackend`](crate::MountBackend) implementations.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// The volume name cannot be mapped to a mountpoint.
    #[error("Invalid volume name {0:?}")]
    InvalidName(String),

    /// Unmount or remove of a volume with no active record.
    #[error("No such mounted volume {name} at {}", .mountpoint.display())]
    NotMounted {
        /// Volume name.
        name: String,
        /// Mountpoint the name maps to.
        mountpoint: PathBuf,
    },

    /// Remove of a volume that still has sharers.
    #[error("Volume {name} is still mounted by {connections} client(s)")]
    StillMounted {
        /// Volume name.
        name: String,
        /// Number of outstanding mounts.
        connections: usize,
    },

    /// The mountpoint exists but is not a directory.
    #[error("Mountpoint {} exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The mountpoint is an unresponsive mount left behind by a dead process.
    #[error("Mountpoint {} is a stale mount; unmount it first", .0.display())]
    StaleMount(PathBuf),

    /// The mountpoint directory could not be created or inspected.
    #[error("Failed to prepare mountpoint {}: {source}", .path.display())]
    Prepare {
        /// Mountpoint path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The kernel refused to bind the filesystem.
    #[error("Failed to bind filesystem at {}: {source}", .mountpoint.display())]
    Bind {
        /// Mountpoint path.
        mountpoint: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The kernel refused to release the filesystem.
    #[error("Failed to unmount {}: {source}", .mountpoint.display())]
    Unmount {
        /// Mountpoint path.
        mountpoint: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Backend-specific failure while constructing the filesystem.
    #[error("Mount backend error: {0}")]
    Backend(String),
}

impl VolumeError {
    /// Returns true for errors caused by calling an operation in the wrong
    /// lifecycle state, as opposed to a failure of the system.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            VolumeError::NotMounted { .. } | VolumeError::StillMounted { .. }
        )
    }
}

/// Result type for volume operations.
pub type VolumeResult<T> = Result<T, VolumeError>;
