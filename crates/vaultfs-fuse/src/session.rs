//! One kernel FUSE connection and its serve loop.
//!
//! A [`MountSession`] moves through `Created -> Serving -> Stopped` and never
//! leaves `Stopped`. Starting binds synchronously and serves on a dedicated
//! thread, so the caller is never blocked by the serve loop. Everything that
//! goes wrong after the call to [`MountSession::start`] (including a failed
//! bind) is published on the session's error stream, which closes once the
//! session is stopped.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use fuser::{Filesystem, SessionUnmounter};
use tracing::{debug, error, info, warn};

use crate::config::MountConfig;
use crate::error::SessionError;

/// Lifecycle state of a [`MountSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet bound.
    Created,
    /// Bound and serving kernel requests.
    Serving,
    /// Terminal.
    Stopped,
}

/// A FUSE filesystem bound to one mountpoint.
pub struct MountSession {
    mountpoint: PathBuf,
    state: SessionState,
    unmounter: Option<SessionUnmounter>,
    serve_thread: Option<JoinHandle<()>>,
    errors_tx: Option<Sender<SessionError>>,
    errors_rx: Receiver<SessionError>,
}

impl MountSession {
    /// Binds `fs` to `mountpoint` and starts serving it in the background.
    ///
    /// Never blocks on the serve loop. If the bind fails the session is
    /// returned already `Stopped`, with the bind error as the only item on
    /// its (closed) error stream.
    pub fn start<FS>(fs: FS, mountpoint: &Path, config: &MountConfig) -> Self
    where
        FS: Filesystem + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let serve_tx = tx.clone();
        let mut session = Self {
            mountpoint: mountpoint.to_path_buf(),
            state: SessionState::Created,
            unmounter: None,
            serve_thread: None,
            errors_tx: Some(tx),
            errors_rx: rx,
        };

        let mut fuse = match fuser::Session::new(fs, mountpoint, &config.mount_options()) {
            Ok(fuse) => fuse,
            Err(source) => {
                error!(mountpoint = %mountpoint.display(), error = %source, "FUSE mount failed");
                session.publish(SessionError::Bind {
                    mountpoint: mountpoint.to_path_buf(),
                    source,
                });
                session.finish();
                return session;
            }
        };
        let unmounter = fuse.unmount_callable();

        let serve_mountpoint = mountpoint.to_path_buf();
        let spawned = std::thread::Builder::new()
            .name("vaultfs-serve".to_string())
            .spawn(move || {
                debug!(mountpoint = %serve_mountpoint.display(), "Serve loop started");
                if let Err(source) = fuse.run() {
                    error!(mountpoint = %serve_mountpoint.display(), error = %source, "Serve loop failed");
                    let _ = serve_tx.send(SessionError::Serve {
                        mountpoint: serve_mountpoint.clone(),
                        source,
                    });
                }
                // Dropping the session releases any mount still held
                drop(fuse);
                debug!(mountpoint = %serve_mountpoint.display(), "Serve loop exited");
            });

        match spawned {
            Ok(handle) => {
                session.unmounter = Some(unmounter);
                session.serve_thread = Some(handle);
                session.state = SessionState::Serving;
                info!(mountpoint = %mountpoint.display(), "FUSE session serving");
            }
            Err(source) => {
                // The unspawned closure owned the session; it has been dropped and unmounted
                session.publish(SessionError::Bind {
                    mountpoint: mountpoint.to_path_buf(),
                    source,
                });
                session.finish();
            }
        }
        session
    }

    /// Mountpoint this session was started on.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Current lifecycle state.
    ///
    /// A serve loop that ended on its own (an unrecoverable error or an
    /// external unmount) reports `Stopped` even before [`stop`](Self::stop).
    pub fn state(&self) -> SessionState {
        match self.state {
            SessionState::Serving if !self.serve_loop_running() => SessionState::Stopped,
            state => state,
        }
    }

    /// Returns true while the serve loop is running.
    pub fn is_serving(&self) -> bool {
        self.state() == SessionState::Serving
    }

    /// Stream of asynchronous errors. Closes when the session stops.
    pub fn errors(&self) -> Receiver<SessionError> {
        self.errors_rx.clone()
    }

    /// Unmounts and waits for the serve loop to exit.
    ///
    /// Idempotent. The final error, if any, is returned and also published
    /// on the error stream. If the kernel refuses the unmount the session
    /// keeps serving and the stop can be retried.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Stopped => return Ok(()),
            SessionState::Created => {
                self.finish();
                return Ok(());
            }
            SessionState::Serving => {}
        }

        debug!(mountpoint = %self.mountpoint.display(), "Stopping FUSE session");
        if let Some(unmounter) = self.unmounter.as_mut()
            && let Err(source) = unmounter.unmount()
        {
            if self.serve_loop_running() {
                let err = SessionError::Unmount {
                    mountpoint: self.mountpoint.clone(),
                    source,
                };
                warn!(error = %err, "Unmount failed, session still serving");
                self.publish(err.duplicate());
                return Err(err);
            }
            // The loop already exited and released the mount
            debug!(error = %source, "Ignoring unmount error for finished session");
        }

        let mut result = Ok(());
        if let Some(handle) = self.serve_thread.take()
            && handle.join().is_err()
        {
            let err = SessionError::Panicked {
                mountpoint: self.mountpoint.clone(),
            };
            self.publish(err.duplicate());
            result = Err(err);
        }

        self.finish();
        info!(mountpoint = %self.mountpoint.display(), "FUSE session stopped");
        result
    }

    fn serve_loop_running(&self) -> bool {
        self.serve_thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn publish(&self, err: SessionError) {
        if let Some(tx) = &self.errors_tx {
            let _ = tx.send(err);
        }
    }

    /// Enters `Stopped` and closes the error stream.
    fn finish(&mut self) {
        self.state = SessionState::Stopped;
        self.unmounter = None;
        self.errors_tx = None;
    }
}

impl Drop for MountSession {
    fn drop(&mut self) {
        if self.state == SessionState::Serving
            && let Err(e) = self.stop()
        {
            warn!(error = %e, "Failed to stop FUSE session on drop");
        }
    }
}

impl std::fmt::Debug for MountSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountSession")
            .field("mountpoint", &self.mountpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
