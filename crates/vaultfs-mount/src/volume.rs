//! Volume lifecycle manager.
//!
//! Maps volume names to mountpoints under a configured root and
//! reference-counts callers that share a mountpoint. All operations that
//! touch the table hold one lock for their whole duration, including the
//! blocking mount and unmount calls into the backend, so a mount of a
//! mountpoint never overlaps a stop of the same mountpoint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{MountBackend, MountHandle};
use crate::error::{VolumeError, VolumeResult};
use crate::mountpoint::{mountpoint_for, prepare_mountpoint, DEFAULT_ACCESS_TIMEOUT};

/// Bookkeeping for one mountpoint.
///
/// `connections == 0` marks an idle record whose handle has been stopped;
/// the next mount replaces it with a fresh session.
struct MountRecord {
    handle: Box<dyn MountHandle>,
    connections: usize,
}

/// Checks that a volume name maps to exactly one directory below the root.
pub fn validate_volume_name(name: &str) -> VolumeResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(VolumeError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Serializes volume lifecycle operations and owns every running session.
pub struct VolumeManager {
    root: PathBuf,
    backend: Box<dyn MountBackend>,
    table: Mutex<HashMap<PathBuf, MountRecord>>,
    probe_timeout: Duration,
}

impl VolumeManager {
    /// Creates a manager that mounts volumes below `root`.
    pub fn new(root: impl Into<PathBuf>, backend: Box<dyn MountBackend>) -> Self {
        Self {
            root: root.into(),
            backend,
            table: Mutex::new(HashMap::new()),
            probe_timeout: DEFAULT_ACCESS_TIMEOUT,
        }
    }

    /// Sets the timeout for mountpoint probes.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Directory volumes are mounted under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Accepts a volume. Nothing is touched until the first mount.
    pub fn create(&self, name: &str) -> VolumeResult<()> {
        let _table = self.table.lock();
        debug!(name, "Volume created");
        Ok(())
    }

    /// Mountpoint for `name`. Pure; never consults the table.
    ///
    /// Fails only for names that [`validate_volume_name`] rejects, the same
    /// names a mount would refuse.
    pub fn path(&self, name: &str) -> VolumeResult<PathBuf> {
        validate_volume_name(name)?;
        Ok(mountpoint_for(&self.root, name))
    }

    /// Mounts `name`, or joins an existing mount of it.
    ///
    /// The first mount prepares the directory and binds a new session;
    /// later mounts only increment the sharer count. On failure the table
    /// is left exactly as it was.
    pub fn mount(&self, name: &str) -> VolumeResult<PathBuf> {
        let mountpoint = self.path(name)?;
        let mut table = self.table.lock();

        if let Some(record) = table.get_mut(&mountpoint)
            && record.connections > 0
        {
            record.connections += 1;
            info!(
                name,
                mountpoint = %mountpoint.display(),
                connections = record.connections,
                "Sharing existing mount"
            );
            return Ok(mountpoint);
        }

        prepare_mountpoint(&mountpoint, self.probe_timeout)?;
        let handle = self.backend.mount(name, &mountpoint)?;
        table.insert(
            mountpoint.clone(),
            MountRecord {
                handle,
                connections: 1,
            },
        );

        info!(
            name,
            mountpoint = %mountpoint.display(),
            backend = self.backend.name(),
            "Volume mounted"
        );
        Ok(mountpoint)
    }

    /// Releases one sharer of `name`, stopping the session with the last.
    ///
    /// If the stop fails the sharer count is left unchanged so the call can
    /// be retried.
    pub fn unmount(&self, name: &str) -> VolumeResult<()> {
        let mountpoint = self.path(name)?;
        let mut table = self.table.lock();

        let Some(record) = table
            .get_mut(&mountpoint)
            .filter(|record| record.connections > 0)
        else {
            return Err(VolumeError::NotMounted {
                name: name.to_string(),
                mountpoint,
            });
        };

        if record.connections > 1 {
            record.connections -= 1;
            debug!(
                name,
                connections = record.connections,
                "Released shared mount"
            );
            return Ok(());
        }

        record.handle.stop()?;
        record.connections = 0;
        info!(name, mountpoint = %mountpoint.display(), "Volume unmounted");
        Ok(())
    }

    /// Forgets an idle volume.
    ///
    /// A volume must be fully unmounted first; removing one that still has
    /// sharers fails and leaves the table unchanged.
    pub fn remove(&self, name: &str) -> VolumeResult<()> {
        let mountpoint = self.path(name)?;
        let mut table = self.table.lock();

        match table.get(&mountpoint).map(|record| record.connections) {
            None => Err(VolumeError::NotMounted {
                name: name.to_string(),
                mountpoint,
            }),
            Some(connections) if connections > 0 => Err(VolumeError::StillMounted {
                name: name.to_string(),
                connections,
            }),
            Some(_) => {
                table.remove(&mountpoint);
                debug!(name, "Volume removed");
                Ok(())
            }
        }
    }

    /// Stops every running session and returns every error encountered.
    ///
    /// A failed stop does not prevent the remaining sessions from being
    /// stopped. Successfully stopped records become idle.
    pub fn stop_all(&self) -> Vec<VolumeError> {
        let mut table = self.table.lock();
        let mut errors = Vec::new();

        for (mountpoint, record) in table.iter_mut() {
            if record.connections == 0 {
                continue;
            }
            match record.handle.stop() {
                Ok(()) => {
                    info!(mountpoint = %mountpoint.display(), "Volume stopped");
                    record.connections = 0;
                }
                Err(e) => {
                    warn!(mountpoint = %mountpoint.display(), error = %e, "Failed to stop volume");
                    errors.push(e);
                }
            }
        }
        errors
    }

    /// Number of sharers of `name`, or `None` if it has no record.
    #[cfg(any(test, feature = "testing"))]
    pub fn connections(&self, name: &str) -> Option<usize> {
        self.table
            .lock()
            .get(&mountpoint_for(&self.root, name))
            .map(|record| record.connections)
    }

    /// Returns true if `name` has a serving session.
    #[cfg(any(test, feature = "testing"))]
    pub fn is_mounted(&self, name: &str) -> bool {
        self.table
            .lock()
            .get(&mountpoint_for(&self.root, name))
            .is_some_and(|record| record.connections > 0 && record.handle.is_serving())
    }
}
