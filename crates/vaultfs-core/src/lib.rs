//! Secret store client and data model for vaultfs.
//!
//! This crate provides the store-facing half of vaultfs: the [`SecretStore`]
//! contract consumed by the filesystem layer, a blocking HTTP client for
//! HashiCorp Vault, and the strongly-typed results of the two operations the
//! filesystem needs.
//!
//! # Components
//!
//! - [`SecretStore`] - point-read and prefix-list of a logical path
//! - [`VaultClient`] - [`SecretStore`] implementation over the Vault HTTP API
//! - [`StoreEntry`] - the key/value bundle returned by a point-read
//! - [`CollectionListing`] - the child names returned by a prefix-list
//! - [`path`] - logical path joining and cleaning
//!
//! # Example
//!
//! ```no_run
//! use vaultfs_core::{SecretStore, StoreConfig, VaultClient};
//!
//! let config = StoreConfig::new("https://vault.example.com:8200", "s.token");
//! let client = VaultClient::new(config)?;
//!
//! if let Some(entry) = client.read("secret/app/db")? {
//!     println!("{} keys", entry.len());
//! }
//! # Ok::<(), vaultfs_core::StoreError>(())
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod entry;
pub mod error;
pub mod path;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::VaultClient;
pub use config::{StoreConfig, DEFAULT_ADDRESS};
pub use entry::{CollectionListing, ListingEntry, StoreEntry};
pub use error::{StoreError, StoreResult};
pub use store::SecretStore;
