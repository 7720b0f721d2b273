//! Volume lifecycle management for vaultfs.
//!
//! This crate owns everything between a volume-plugin request and a running
//! filesystem: mapping volume names to mountpoints, reference-counting
//! callers that share one mountpoint, preparing mountpoint directories, and
//! shutting everything down on a signal.
//!
//! # Components
//!
//! - [`VolumeManager`] - serialized create/mount/path/unmount/remove/stop-all
//! - [`MountBackend`] - creates a serving filesystem on a mountpoint
//! - [`MountHandle`] - controls one running filesystem
//! - [`prepare_mountpoint`] - creates the directory and rejects stale mounts
//! - [`signal`] - SIGINT/SIGTERM/SIGHUP handling with forced exit on repeat
//!
//! The manager knows nothing about FUSE; the `vaultfs-fuse` crate provides
//! the production [`MountBackend`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod backend;
mod error;
mod mountpoint;
pub mod signal;
mod volume;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{MountBackend, MountHandle};
pub use error::{VolumeError, VolumeResult};
pub use mountpoint::{
    check_mountpoint_status, prepare_mountpoint, MountPointStatus, DEFAULT_ACCESS_TIMEOUT,
};
pub use volume::{validate_volume_name, VolumeManager};
