//! Configuration file support.
//!
//! Settings are read from a TOML file and act as defaults for the command
//! line. The first file found wins:
//! 1. the path given with `--config` (must exist)
//! 2. `/etc/sysconfig/vaultfs.toml`
//! 3. the user config directory (`~/.config/vaultfs/config.toml` on Linux)
//!
//! ```toml
//! address = "https://vault.internal:8200"
//! token = "s.xxxxxxxx"
//! root = "secret/team"
//! socket = "/run/docker/plugins/vault.sock"
//! log_level = "debug"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sysconfig/vaultfs.toml";

/// Defaults loaded from a configuration file. Every key is optional.
#[derive(Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub address: Option<String>,
    pub insecure: Option<bool>,
    pub token: Option<String>,
    pub root: Option<String>,
    pub socket: Option<PathBuf>,
    pub allow_other: Option<bool>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub log_destination: Option<String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("address", &self.address)
            .field("insecure", &self.insecure)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("root", &self.root)
            .field("socket", &self.socket)
            .field("allow_other", &self.allow_other)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("log_destination", &self.log_destination)
            .finish()
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration file")
    }

    /// Load settings from `explicit`, or from the first default location
    /// that exists. Missing default files yield empty settings.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let settings = Self::read(path)?;
            return Ok((settings, Some(path.to_path_buf())));
        }

        for path in default_paths() {
            if path.is_file() {
                let settings = Self::read(&path)?;
                return Ok((settings, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("In config file: {}", path.display()))
    }
}

/// Candidate configuration files in lookup order.
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "vaultfs") {
        paths.push(dirs.config_dir().join("config.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_file() {
        let settings = Settings::from_toml(
            r#"
            address = "https://vault:8200"
            insecure = true
            token = "s.abc"
            root = "secret/app"
            socket = "/tmp/vault.sock"
            allow_other = true
            log_level = "debug"
            log_format = "json"
            log_destination = "stderr:"
            "#,
        )
        .unwrap();

        assert_eq!(settings.address.as_deref(), Some("https://vault:8200"));
        assert_eq!(settings.insecure, Some(true));
        assert_eq!(settings.token.as_deref(), Some("s.abc"));
        assert_eq!(settings.root.as_deref(), Some("secret/app"));
        assert_eq!(settings.socket, Some(PathBuf::from("/tmp/vault.sock")));
        assert_eq!(settings.allow_other, Some(true));
        assert_eq!(settings.log_format.as_deref(), Some("json"));
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Settings::from_toml("adress = \"typo\"").is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let settings = Settings::from_toml("token = \"s.very-secret\"").unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("s.very-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "root = \"kv\"").unwrap();

        let (settings, source) = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.root.as_deref(), Some("kv"));
        assert_eq!(source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_default_paths_start_with_system_file() {
        let paths = default_paths();
        assert_eq!(paths[0], PathBuf::from(SYSTEM_CONFIG_PATH));
    }
}
