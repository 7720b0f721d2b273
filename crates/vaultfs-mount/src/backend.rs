//! Mount backend abstraction.
//!
//! The [`VolumeManager`](crate::VolumeManager) never talks to the kernel
//! itself. It asks a [`MountBackend`] for a running filesystem and keeps the
//! returned [`MountHandle`] until the last sharer unmounts.

use std::path::Path;

use crate::error::VolumeError;

/// Creates serving filesystems on mountpoints.
pub trait MountBackend: Send + Sync {
    /// Short backend identifier used in logs.
    fn name(&self) -> &'static str;

    /// Binds a new filesystem to `mountpoint` and starts serving it.
    ///
    /// The mountpoint directory already exists when this is called. The
    /// call returns once the filesystem is bound; serving continues in the
    /// background. A bind failure must be returned here, never reported
    /// only asynchronously, so that no half-registered volume exists.
    fn mount(&self, volume: &str, mountpoint: &Path) -> Result<Box<dyn MountHandle>, VolumeError>;
}

/// Control handle for one running filesystem.
pub trait MountHandle: Send {
    /// The directory the filesystem is bound to.
    fn mountpoint(&self) -> &Path;

    /// Unmounts the filesystem and waits for its serve loop to exit.
    ///
    /// Idempotent: stopping a stopped handle succeeds. If unmounting fails
    /// the handle keeps serving and the stop may be retried.
    fn stop(&mut self) -> Result<(), VolumeError>;

    /// Returns true until the filesystem has been stopped.
    fn is_serving(&self) -> bool;
}
