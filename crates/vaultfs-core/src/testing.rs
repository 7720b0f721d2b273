//! In-memory secret store for tests.
//!
//! [`MemoryStore`] behaves like a Vault KV mount: point-reads return exactly
//! what was inserted at a path and listings are derived from the inserted
//! paths, with sub-collections marked by a trailing separator. Failures can
//! be injected per path or for the whole store.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use crate::entry::{CollectionListing, StoreEntry};
use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::store::SecretStore;

/// In-memory [`SecretStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, StoreEntry>>,
    failing: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
    lists: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an entry at `path`, replacing any previous one.
    pub fn insert<I, K, V>(&self, path: &str, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.entries
            .write()
            .insert(path::clean(path), data.into_iter().collect());
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with<I, K, V>(self, path: &str, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.insert(path, data);
        self
    }

    /// Deletes the entry at `path`.
    pub fn remove(&self, path: &str) -> Option<StoreEntry> {
        self.entries.write().remove(&path::clean(path))
    }

    /// Makes every read and list of `path` fail with a store error.
    pub fn fail_path(&self, path: &str) {
        self.failing.write().insert(path::clean(path));
    }

    /// Makes every operation fail, as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of point-reads served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of prefix-lists served so far.
    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    fn check(&self, path: &str) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is unreachable".to_string()));
        }
        if self.failing.read().contains(path) {
            return Err(StoreError::Http {
                path: path.to_string(),
                status: 500,
                errors: vec!["injected failure".to_string()],
            });
        }
        Ok(())
    }
}

impl SecretStore for MemoryStore {
    fn read(&self, path: &str) -> StoreResult<Option<StoreEntry>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let path = path::clean(path);
        self.check(&path)?;
        Ok(self.entries.read().get(&path).cloned())
    }

    fn list(&self, path: &str) -> StoreResult<Option<CollectionListing>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let path = path::clean(path);
        self.check(&path)?;

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let entries = self.entries.read();
        let mut names: Vec<String> = Vec::new();
        for key in entries.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let name = match rest.split_once('/') {
                Some((head, _)) => format!("{head}/"),
                None => rest.to_string(),
            };
            if !names.contains(&name) {
                names.push(name);
            }
        }

        if names.is_empty() {
            Ok(None)
        } else {
            Ok(Some(CollectionListing::from_raw(names)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> MemoryStore {
        MemoryStore::new()
            .with("a/b", [("value", json!("1"))])
            .with("a/c/d", [("value", json!("2"))])
            .with("a/c/e/f", [("value", json!("3"))])
            .with("top", [("value", json!("4"))])
    }

    #[test]
    fn test_read_present_and_absent() {
        let store = sample();
        let entry = store.read("a/b").unwrap().unwrap();
        assert_eq!(entry.get("value"), Some(&json!("1")));
        assert!(store.read("a/c").unwrap().is_none());
        assert!(store.read("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_derives_children() {
        let store = sample();
        let listing = store.list("a").unwrap().unwrap();
        let raw: Vec<_> = listing
            .iter()
            .map(|e| (e.name().to_string(), e.is_collection()))
            .collect();
        assert_eq!(raw, [("b".to_string(), false), ("c".to_string(), true)]);

        let nested = store.list("a/c").unwrap().unwrap();
        assert_eq!(nested.len(), 2);
    }

    #[test]
    fn test_list_root() {
        let store = sample();
        let listing = store.list("").unwrap().unwrap();
        let names: Vec<_> = listing.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["a", "top"]);
    }

    #[test]
    fn test_list_without_children_is_absent() {
        let store = sample();
        assert!(store.list("a/b").unwrap().is_none());
        assert!(store.list("nothing").unwrap().is_none());
    }

    #[test]
    fn test_injected_failures() {
        let store = sample();
        store.fail_path("a/b");
        assert!(store.read("a/b").is_err());
        assert!(store.read("top").is_ok());

        store.set_unavailable(true);
        assert!(matches!(store.list("a"), Err(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.list("a").is_ok());
    }

    #[test]
    fn test_counters() {
        let store = sample();
        let _ = store.read("a/b");
        let _ = store.list("a");
        let _ = store.list("a");
        assert_eq!(store.read_count(), 1);
        assert_eq!(store.list_count(), 2);
    }
}
