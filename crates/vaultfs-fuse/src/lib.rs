//! Read-only FUSE filesystem over a secret store.
//!
//! This crate mounts a [`SecretStore`](vaultfs_core::SecretStore) as a
//! directory tree: collections become directories, entries become files
//! whose content is the entry rendered as JSON.
//!
//! # Architecture
//!
//! - [`node`] - stateless nodes that resolve lookups, listings and content
//!   against the store on every call
//! - [`inode`] - CRC-64 path-derived inode numbers and the kernel registry
//! - [`SecretsFs`] - the fuser `Filesystem` implementation
//! - [`MountSession`] - one kernel connection with a background serve loop
//! - [`FuseBackend`] - `MountBackend` for the volume manager
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use vaultfs_core::{StoreConfig, VaultClient};
//! use vaultfs_fuse::{MountConfig, MountSession, SecretsFs};
//!
//! let client = VaultClient::new(StoreConfig::new("https://localhost:8200", "s.token"))?;
//! let fs = SecretsFs::new(Arc::new(client), "secret", MountConfig::default());
//! let mut session = MountSession::start(fs, Path::new("/mnt/secrets"), &MountConfig::default());
//! // ...
//! session.stop()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod inode;
pub mod node;
pub mod session;

pub use backend::{FuseBackend, FuseMountHandle};
pub use config::MountConfig;
pub use error::{FuseError, FuseResult, SessionError};
pub use filesystem::SecretsFs;
pub use inode::{inode_for, ROOT_INODE};
pub use node::{Node, NodeKind};
pub use session::{MountSession, SessionState};
