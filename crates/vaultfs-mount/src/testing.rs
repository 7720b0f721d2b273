//! Recording mount backend for lifecycle tests.
//!
//! [`RecordingBackend`] never touches the kernel. Every mount produces a
//! numbered session whose lifecycle is recorded as [`BackendEvent`]s, so
//! tests can assert exactly which sessions were created and stopped and in
//! what order. Bind and unmount failures can be injected per volume.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{MountBackend, MountHandle};
use crate::error::VolumeError;

/// One observed backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Session `id` was bound for `volume`.
    Mounted {
        /// Session number, starting at 1.
        id: usize,
        /// Volume name.
        volume: String,
    },
    /// Session `id` finished stopping.
    Stopped {
        /// Session number.
        id: usize,
    },
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    events: Vec<BackendEvent>,
    active: HashSet<usize>,
    fail_mount: HashSet<String>,
    fail_stop: HashSet<String>,
    stop_delay: Duration,
}

/// [`MountBackend`] that records calls instead of mounting.
///
/// Clones share state, so a test can keep one clone while the manager owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<State>>,
}

impl RecordingBackend {
    /// Creates a backend with no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes mounts of `volume` fail with a bind error.
    pub fn fail_mount(&self, volume: &str, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.fail_mount.insert(volume.to_string());
        } else {
            state.fail_mount.remove(volume);
        }
    }

    /// Makes stops of sessions for `volume` fail with an unmount error.
    pub fn fail_stop(&self, volume: &str, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.fail_stop.insert(volume.to_string());
        } else {
            state.fail_stop.remove(volume);
        }
    }

    /// Makes every successful stop take `delay`.
    pub fn set_stop_delay(&self, delay: Duration) {
        self.state.lock().stop_delay = delay;
    }

    /// All events so far, in order.
    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().events.clone()
    }

    /// Number of sessions bound so far.
    pub fn mount_count(&self) -> usize {
        self.count(|e| matches!(e, BackendEvent::Mounted { .. }))
    }

    /// Number of sessions stopped so far.
    pub fn stop_count(&self) -> usize {
        self.count(|e| matches!(e, BackendEvent::Stopped { .. }))
    }

    /// Number of sessions currently serving.
    pub fn active_sessions(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Returns true if session `id` is serving.
    pub fn is_active(&self, id: usize) -> bool {
        self.state.lock().active.contains(&id)
    }

    fn count(&self, pred: impl Fn(&BackendEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| pred(e)).count()
    }
}

impl MountBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn mount(&self, volume: &str, mountpoint: &Path) -> Result<Box<dyn MountHandle>, VolumeError> {
        let mut state = self.state.lock();
        if state.fail_mount.contains(volume) {
            return Err(VolumeError::Bind {
                mountpoint: mountpoint.to_path_buf(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }

        state.next_id += 1;
        let id = state.next_id;
        state.active.insert(id);
        state.events.push(BackendEvent::Mounted {
            id,
            volume: volume.to_string(),
        });

        Ok(Box::new(RecordingHandle {
            id,
            volume: volume.to_string(),
            mountpoint: mountpoint.to_path_buf(),
            state: Arc::clone(&self.state),
            serving: true,
        }))
    }
}

/// Handle returned by [`RecordingBackend`].
#[derive(Debug)]
pub struct RecordingHandle {
    id: usize,
    volume: String,
    mountpoint: PathBuf,
    state: Arc<Mutex<State>>,
    serving: bool,
}

impl RecordingHandle {
    /// Session number.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl MountHandle for RecordingHandle {
    fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    fn stop(&mut self) -> Result<(), VolumeError> {
        if !self.serving {
            return Ok(());
        }

        let delay = {
            let state = self.state.lock();
            if state.fail_stop.contains(&self.volume) {
                return Err(VolumeError::Unmount {
                    mountpoint: self.mountpoint.clone(),
                    source: io::Error::from_raw_os_error(libc::EBUSY),
                });
            }
            state.stop_delay
        };

        // Simulates waiting for the serve loop to drain
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        state.active.remove(&self.id);
        state.events.push(BackendEvent::Stopped { id: self.id });
        self.serving = false;
        Ok(())
    }

    fn is_serving(&self) -> bool {
        self.serving
    }
}
