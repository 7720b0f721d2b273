//! The secret store contract.

use std::sync::Arc;

use crate::entry::{CollectionListing, StoreEntry};
use crate::error::StoreResult;

/// A hierarchical key/value secret store.
///
/// Implementations must be safe to call concurrently from many threads;
/// the filesystem issues one call per kernel request with no shared state
/// between calls. Calls may block on network I/O.
///
/// Both operations distinguish "absent" (`Ok(None)`) from failure (`Err`).
/// A failure must never be reported as absence.
pub trait SecretStore: Send + Sync {
    /// Point-read of the entry stored at `path`.
    fn read(&self, path: &str) -> StoreResult<Option<StoreEntry>>;

    /// Prefix-list of the children below `path`.
    ///
    /// Returns `Ok(None)` when the store knows nothing under `path`.
    fn list(&self, path: &str) -> StoreResult<Option<CollectionListing>>;
}

impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    fn read(&self, path: &str) -> StoreResult<Option<StoreEntry>> {
        (**self).read(path)
    }

    fn list(&self, path: &str) -> StoreResult<Option<CollectionListing>> {
        (**self).list(path)
    }
}

impl<T: SecretStore + ?Sized> SecretStore for Box<T> {
    fn read(&self, path: &str) -> StoreResult<Option<StoreEntry>> {
        (**self).read(path)
    }

    fn list(&self, path: &str) -> StoreResult<Option<CollectionListing>> {
        (**self).list(path)
    }
}
