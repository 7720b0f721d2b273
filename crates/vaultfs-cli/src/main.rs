#![deny(unsafe_code)]

mod commands;
mod config;
mod logging;
mod plugin;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{docker, mount};
use crate::config::Settings;
use crate::logging::LogOptions;

/// Mount Vault secrets as a read-only filesystem
#[derive(Parser)]
#[command(name = "vaultfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Mount secret/ at /mnt/secrets until Ctrl+C
    VAULT_TOKEN=s.xxxx vaultfs mount /mnt/secrets

    # Mount a different prefix from a dev server
    vaultfs mount -a http://127.0.0.1:8200 -r secret/app /mnt/app

    # Serve Docker volumes under /var/lib/vaultfs
    vaultfs docker /var/lib/vaultfs
    docker run --volume-driver vault -v db:/secrets alpine cat /secrets/password")]
struct Cli {
    /// Config file [default: /etc/sysconfig/vaultfs.toml, then the user config dir]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error [default: info]
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format: text or json [default: text]
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<String>,

    /// Log destination: stdout:, stderr:, journald: or file:/path [default: stdout:]
    ///
    /// Syslog is not supported; unrecognized destinations fall back to stdout.
    #[arg(long, global = true, value_name = "DEST")]
    log_destination: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a Vault FS at the specified mountpoint
    Mount(mount::Args),

    /// Start the Docker volume server at the specified root
    Docker(docker::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse();

    // Config file errors are reported after logging is up
    let loaded = Settings::load(cli.config.as_deref());
    let settings_ref = loaded.as_ref().map(|(s, _)| s).ok();
    let options = LogOptions::parse(
        cli.log_level.as_deref().or_else(|| settings_ref.and_then(|s| s.log_level.as_deref())),
        cli.log_format.as_deref().or_else(|| settings_ref.and_then(|s| s.log_format.as_deref())),
        cli.log_destination
            .as_deref()
            .or_else(|| settings_ref.and_then(|s| s.log_destination.as_deref())),
    );
    let _log_guard = logging::setup_tracing(&options);

    let (settings, source) = loaded?;
    if let Some(path) = source {
        tracing::info!(config = %path.display(), "Using config file from disk");
    }

    lock_memory();

    match &cli.command {
        Commands::Mount(args) => mount::execute(args, &settings),
        Commands::Docker(args) => docker::execute(args, &settings),
    }
}

/// Keeps secrets out of swap. Failure is not fatal.
#[cfg(unix)]
fn lock_memory() {
    use nix::sys::mman::{MlockAllFlags, mlockall};

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => tracing::debug!("Locked process memory"),
        Err(e) => tracing::warn!(error = %e, "Could not lock memory, secrets may be swapped to disk"),
    }
}

#[cfg(not(unix))]
fn lock_memory() {}
