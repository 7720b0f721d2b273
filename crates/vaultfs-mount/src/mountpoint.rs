//! Mountpoint inspection and preparation.
//!
//! When a FUSE daemon dies without unmounting, its mountpoint becomes
//! "stale": any operation on it either blocks indefinitely or fails with
//! `ENOTCONN`. Every probe here runs on a helper thread with a timeout so a
//! stale mount cannot wedge the caller (which holds the volume table lock).

use std::fs::DirBuilder;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::VolumeError;

/// Default timeout for mountpoint probes.
pub const DEFAULT_ACCESS_TIMEOUT: Duration = Duration::from_millis(500);

/// Result of probing a potential mountpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountPointStatus {
    /// Path is a readable directory.
    Available,
    /// Path did not answer in time or reports a disconnected filesystem.
    StaleMountDetected,
    /// Path does not exist.
    DoesNotExist,
    /// Path exists but is not a directory.
    NotADirectory,
    /// Some other error occurred.
    Error(String),
}

fn is_disconnected(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENOTCONN)
}

fn probe(path: &Path) -> MountPointStatus {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => match std::fs::read_dir(path) {
            Ok(mut entries) => {
                // Iterating forces a round trip to a FUSE server
                let _ = entries.next();
                MountPointStatus::Available
            }
            Err(e) if is_disconnected(&e) => MountPointStatus::StaleMountDetected,
            Err(e) => MountPointStatus::Error(e.to_string()),
        },
        Ok(_) => MountPointStatus::NotADirectory,
        Err(e) if e.kind() == io::ErrorKind::NotFound => MountPointStatus::DoesNotExist,
        Err(e) if is_disconnected(&e) => MountPointStatus::StaleMountDetected,
        Err(e) => MountPointStatus::Error(e.to_string()),
    }
}

/// Probes `path` on a helper thread, giving up after `timeout`.
///
/// A probe that does not finish in time is reported as a stale mount; the
/// helper thread is left to finish (or block) on its own.
pub fn check_mountpoint_status(path: &Path, timeout: Duration) -> MountPointStatus {
    let path_buf = path.to_path_buf();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let _ = tx.send(probe(&path_buf));
    });

    match rx.recv_timeout(timeout) {
        Ok(status) => status,
        Err(mpsc::RecvTimeoutError::Timeout) => MountPointStatus::StaleMountDetected,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            MountPointStatus::Error("Mountpoint probe thread panicked".to_string())
        }
    }
}

/// Makes sure `path` is a directory a filesystem can be bound to.
///
/// Missing directories (and their parents) are created with mode `0o755`.
/// An existing non-directory or a stale mount is an error.
pub fn prepare_mountpoint(path: &Path, timeout: Duration) -> Result<(), VolumeError> {
    match check_mountpoint_status(path, timeout) {
        MountPointStatus::Available => Ok(()),
        MountPointStatus::DoesNotExist => {
            debug!(mountpoint = %path.display(), "Creating mountpoint directory");
            create_dir(path).map_err(|source| VolumeError::Prepare {
                path: path.to_path_buf(),
                source,
            })
        }
        MountPointStatus::NotADirectory => Err(VolumeError::NotADirectory(path.to_path_buf())),
        MountPointStatus::StaleMountDetected => {
            warn!(mountpoint = %path.display(), "Stale mount detected");
            Err(VolumeError::StaleMount(path.to_path_buf()))
        }
        MountPointStatus::Error(msg) => Err(VolumeError::Prepare {
            path: path.to_path_buf(),
            source: io::Error::other(msg),
        }),
    }
}

#[cfg(unix)]
fn create_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    DirBuilder::new().recursive(true).mode(0o755).create(path)
}

#[cfg(not(unix))]
fn create_dir(path: &Path) -> io::Result<()> {
    DirBuilder::new().recursive(true).create(path)
}

/// Joins a volume name onto the mount root without letting an absolute
/// name escape it.
pub(crate) fn mountpoint_for(root: &Path, name: &str) -> PathBuf {
    root.join(name.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_status_of_missing_path() {
        let dir = TempDir::new().unwrap();
        let status = check_mountpoint_status(&dir.path().join("missing"), DEFAULT_ACCESS_TIMEOUT);
        assert_eq!(status, MountPointStatus::DoesNotExist);
    }

    #[test]
    fn test_status_of_directory() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            check_mountpoint_status(dir.path(), DEFAULT_ACCESS_TIMEOUT),
            MountPointStatus::Available
        );
    }

    #[test]
    fn test_status_of_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(
            check_mountpoint_status(&file, DEFAULT_ACCESS_TIMEOUT),
            MountPointStatus::NotADirectory
        );
    }

    #[test]
    fn test_prepare_creates_nested_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("volumes").join("db");
        prepare_mountpoint(&target, DEFAULT_ACCESS_TIMEOUT).unwrap();
        assert!(target.is_dir());

        // Second call finds it in place
        prepare_mountpoint(&target, DEFAULT_ACCESS_TIMEOUT).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_uses_mode_755() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("db");
        prepare_mountpoint(&target, DEFAULT_ACCESS_TIMEOUT).unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        // umask can only remove bits
        assert_eq!(mode & !0o755, 0);
    }

    #[test]
    fn test_prepare_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("db");
        std::fs::write(&file, b"x").unwrap();
        let err = prepare_mountpoint(&file, DEFAULT_ACCESS_TIMEOUT).unwrap_err();
        assert!(matches!(err, VolumeError::NotADirectory(_)));
    }

    #[test]
    fn test_mountpoint_for_stays_under_root() {
        let root = Path::new("/var/lib/vaultfs");
        assert_eq!(mountpoint_for(root, "db"), Path::new("/var/lib/vaultfs/db"));
        assert_eq!(mountpoint_for(root, "/db"), Path::new("/var/lib/vaultfs/db"));
    }
}
