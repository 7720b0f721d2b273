//! FUSE backend implementation of the `MountBackend` trait.
//!
//! Every mount gets its own [`SecretsFs`] and [`MountSession`] over a shared
//! store client. Errors a session reports after a successful bind are
//! drained and logged by a per-session thread; they do not unmount the
//! volume.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};
use vaultfs_core::SecretStore;
use vaultfs_mount::{MountBackend, MountHandle, VolumeError};

use crate::config::MountConfig;
use crate::error::SessionError;
use crate::filesystem::SecretsFs;
use crate::session::{MountSession, SessionState};

/// Handle to a FUSE-mounted volume.
///
/// Dropping the handle stops the session.
pub struct FuseMountHandle {
    session: MountSession,
}

impl FuseMountHandle {
    /// The underlying session.
    pub fn session(&self) -> &MountSession {
        &self.session
    }
}

impl MountHandle for FuseMountHandle {
    fn mountpoint(&self) -> &Path {
        self.session.mountpoint()
    }

    fn stop(&mut self) -> Result<(), VolumeError> {
        self.session.stop().map_err(|e| match e {
            SessionError::Unmount { mountpoint, source } => {
                VolumeError::Unmount { mountpoint, source }
            }
            other => VolumeError::Backend(other.to_string()),
        })
    }

    fn is_serving(&self) -> bool {
        self.session.is_serving()
    }
}

/// Mounts secret store views with FUSE.
pub struct FuseBackend {
    store: Arc<dyn SecretStore>,
    root: String,
    config: MountConfig,
}

impl FuseBackend {
    /// Creates a backend serving store path `root` on every mount.
    pub fn new(store: Arc<dyn SecretStore>, root: impl Into<String>, config: MountConfig) -> Self {
        Self {
            store,
            root: root.into(),
            config,
        }
    }

    fn spawn_error_logger(session: &MountSession, volume: &str) {
        let errors = session.errors();
        let volume = volume.to_string();
        let mountpoint: PathBuf = session.mountpoint().to_path_buf();
        let spawned = std::thread::Builder::new()
            .name("vaultfs-errors".to_string())
            .spawn(move || {
                for err in errors.iter() {
                    error!(
                        volume = %volume,
                        mountpoint = %mountpoint.display(),
                        error = %err,
                        "FUSE session error"
                    );
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "Failed to start session error logger");
        }
    }
}

impl MountBackend for FuseBackend {
    fn name(&self) -> &'static str {
        "fuse"
    }

    fn mount(&self, volume: &str, mountpoint: &Path) -> Result<Box<dyn MountHandle>, VolumeError> {
        info!(
            volume,
            root = %self.root,
            mountpoint = %mountpoint.display(),
            "Starting FUSE mount"
        );

        let fs = SecretsFs::new(Arc::clone(&self.store), &self.root, self.config.clone());
        let session = MountSession::start(fs, mountpoint, &self.config);

        if session.state() != SessionState::Serving {
            let source = match session.errors().try_recv() {
                Ok(SessionError::Bind { source, .. } | SessionError::Serve { source, .. }) => {
                    source
                }
                Ok(other) => std::io::Error::other(other.to_string()),
                Err(_) => std::io::Error::other("FUSE session ended during mount"),
            };
            return Err(VolumeError::Bind {
                mountpoint: mountpoint.to_path_buf(),
                source,
            });
        }

        Self::spawn_error_logger(&session, volume);
        Ok(Box::new(FuseMountHandle { session }))
    }
}
