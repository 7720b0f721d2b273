//! Docker command - serve the volume plugin protocol for volumes under a root directory.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use vaultfs_fuse::FuseBackend;
use vaultfs_mount::VolumeManager;
use vaultfs_mount::signal::Shutdown;

use super::VaultArgs;
use crate::config::Settings;
use crate::plugin::PluginServer;

/// Socket Docker scans for plugins named `vault`.
pub const DEFAULT_SOCKET: &str = "/run/docker/plugins/vault.sock";

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
    /// Directory under which volume mountpoints are created
    #[arg(value_name = "ROOT")]
    pub volume_root: PathBuf,

    #[command(flatten)]
    pub vault: VaultArgs,

    /// Unix socket Docker connects to [default: /run/docker/plugins/vault.sock]
    #[arg(short, long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
}

/// Serves plugin requests until a shutdown signal, then stops every volume.
///
/// Returns `false` if any volume failed to stop.
pub fn execute(args: &Args, settings: &Settings) -> Result<bool> {
    let socket = args
        .socket
        .clone()
        .or_else(|| settings.socket.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET));

    let store = args.vault.connect(settings)?;
    let backend = FuseBackend::new(store, args.vault.root(settings), args.vault.mount_config(settings));
    let manager = Arc::new(VolumeManager::new(&args.volume_root, Box::new(backend)));
    let shutdown = Shutdown::install().context("Failed to install signal handlers")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("vaultfs-plugin")
        .build()
        .context("Failed to start async runtime")?;

    info!(root = %args.volume_root.display(), socket = %socket.display(), "Starting volume plugin");
    let served = runtime.block_on(async {
        let server = PluginServer::bind(&socket, Arc::clone(&manager))?;
        let waiter = shutdown.clone();
        server
            .serve(async move {
                let _ = tokio::task::spawn_blocking(move || waiter.wait()).await;
            })
            .await;
        Ok::<_, std::io::Error>(())
    });
    // Let in-flight manager calls finish before tearing volumes down
    drop(runtime);

    let errors = manager.stop_all();
    for err in &errors {
        error!(error = %err, "Error stopping volume");
    }

    served.with_context(|| format!("Failed serving plugin socket {}", socket.display()))?;
    info!("Volume plugin stopped");
    Ok(errors.is_empty())
}
