//! Mount command - expose the Vault root prefix at a directory until signalled.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use vaultfs_fuse::{MountSession, SecretsFs, SessionError};
use vaultfs_mount::signal::Shutdown;
use vaultfs_mount::{DEFAULT_ACCESS_TIMEOUT, prepare_mountpoint};

use super::VaultArgs;
use crate::config::Settings;

/// How often the session is checked for an unexpected exit.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
    /// Directory to mount the secrets on (created if missing)
    pub mountpoint: PathBuf,

    #[command(flatten)]
    pub vault: VaultArgs,
}

/// Mounts and serves until a shutdown signal or a session failure.
///
/// Returns `false` if any session error was reported.
pub fn execute(args: &Args, settings: &Settings) -> Result<bool> {
    let store = args.vault.connect(settings)?;
    let root = args.vault.root(settings);
    let config = args.vault.mount_config(settings);

    prepare_mountpoint(&args.mountpoint, DEFAULT_ACCESS_TIMEOUT)
        .with_context(|| format!("Cannot use mountpoint {}", args.mountpoint.display()))?;
    let shutdown = Shutdown::install().context("Failed to install signal handlers")?;

    let fs = SecretsFs::new(store, &root, config.clone());
    let mut session = MountSession::start(fs, &args.mountpoint, &config);
    let errors = session.errors();

    if session.is_serving() {
        info!(
            mountpoint = %args.mountpoint.display(),
            root = %root,
            "Mounted, press Ctrl+C to unmount"
        );
        while session.is_serving() {
            if let Some(signal) = shutdown.wait_timeout(POLL_INTERVAL) {
                info!(signal, "Stopping");
                break;
            }
        }
    }

    // A failed unmount leaves the session serving and the stream open
    let pending: Vec<SessionError> = match session.stop() {
        Ok(()) => errors.iter().collect(),
        Err(_) => errors.try_iter().collect(),
    };

    for err in &pending {
        error!(error = %err, "Error mounting");
    }
    Ok(pending.is_empty())
}
