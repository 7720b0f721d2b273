//! Subcommand implementations and the Vault flags they share.

pub mod docker;
pub mod mount;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::sync::Arc;
use tracing::info;
use vaultfs_core::{DEFAULT_ADDRESS, SecretStore, StoreConfig, VaultClient};
use vaultfs_fuse::MountConfig;

use crate::config::Settings;

/// Store path exposed when no root is configured.
pub const DEFAULT_ROOT: &str = "secret";

/// Connection flags for the Vault server. Unset flags fall back to the
/// config file, then to built-in defaults.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct VaultArgs {
    /// Vault address [default: https://localhost:8200]
    #[arg(short, long, env = "VAULT_ADDR", value_name = "URL")]
    pub address: Option<String>,

    /// Skip TLS certificate verification
    #[arg(short, long)]
    pub insecure: bool,

    /// Vault token
    #[arg(short, long, env = "VAULT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Secret path shown as the filesystem root [default: secret]
    #[arg(short, long, value_name = "PATH")]
    pub root: Option<String>,

    /// Let users other than the mounting user read the filesystem
    #[arg(long)]
    pub allow_other: bool,
}

impl VaultArgs {
    pub fn store_config(&self, settings: &Settings) -> Result<StoreConfig> {
        let address = self
            .address
            .clone()
            .or_else(|| settings.address.clone())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let token = self
            .token
            .clone()
            .or_else(|| settings.token.clone())
            .context("No Vault token: pass --token or set VAULT_TOKEN")?;
        let insecure = self.insecure || settings.insecure.unwrap_or(false);
        Ok(StoreConfig::new(address, token).insecure(insecure))
    }

    pub fn connect(&self, settings: &Settings) -> Result<Arc<dyn SecretStore>> {
        let client = VaultClient::new(self.store_config(settings)?)
            .context("Failed to create Vault client")?;
        info!(address = %client.address(), "Using Vault server");
        Ok(Arc::new(client))
    }

    pub fn root(&self, settings: &Settings) -> String {
        self.root
            .clone()
            .or_else(|| settings.root.clone())
            .unwrap_or_else(|| DEFAULT_ROOT.to_string())
    }

    pub fn mount_config(&self, settings: &Settings) -> MountConfig {
        MountConfig::default().allow_other(self.allow_other || settings.allow_other.unwrap_or(false))
    }
}
