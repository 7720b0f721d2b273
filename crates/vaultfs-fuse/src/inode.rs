//! Inode assignment and the kernel inode registry.
//!
//! Inode numbers are derived from store paths, never allocated: the inode of
//! a path is the CRC-64 (ISO polynomial) of the full store path string. The
//! same path therefore always yields the same inode, regardless of which
//! lookup produced it or in what order lookups happened.
//!
//! The root of the mount is the reserved sentinel [`ROOT_INODE`]. A real
//! path whose checksum happens to equal `0` or [`ROOT_INODE`] has its top bit
//! flipped so it can never alias the root.
//!
//! [`InodeTable`] remembers which path each kernel-visible inode stands for,
//! so later callbacks that only carry an inode number can be re-resolved
//! against the store. It holds names only; attributes and contents are
//! never retained.

use std::sync::atomic::{AtomicU64, Ordering};

use crc::{Crc, CRC_64_GO_ISO};
use dashmap::DashMap;
use tracing::{trace, warn};

use crate::node::NodeKind;

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Inode number of a non-root store path.
pub fn inode_for(path: &str) -> u64 {
    let sum = CRC64.checksum(path.as_bytes());
    if sum == 0 || sum == ROOT_INODE {
        sum ^ (1 << 63)
    } else {
        sum
    }
}

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Full store path.
    pub path: String,
    /// Node kind at the time of the last lookup.
    pub kind: NodeKind,
    /// Lookup count for `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    fn new(path: String, kind: NodeKind) -> Self {
        Self {
            path,
            kind,
            nlookup: AtomicU64::new(1),
        }
    }

    /// Returns the current lookup count.
    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }
}

/// Thread-safe map from kernel inode numbers to store paths.
pub struct InodeTable {
    entries: DashMap<u64, InodeEntry>,
}

impl InodeTable {
    /// Creates a table with the root pre-registered at `root_path`.
    pub fn new(root_path: &str) -> Self {
        let entries = DashMap::new();
        entries.insert(
            ROOT_INODE,
            InodeEntry::new(root_path.to_string(), NodeKind::Root),
        );
        Self { entries }
    }

    /// Records that the kernel now holds one more reference to `inode`.
    ///
    /// A later lookup of the same path refreshes the kind, since a leaf can
    /// turn into a collection (or back) between lookups.
    pub fn remember(&self, inode: u64, path: &str, kind: NodeKind) {
        if inode == ROOT_INODE {
            return;
        }
        self.entries
            .entry(inode)
            .and_modify(|entry| {
                if entry.path != path {
                    warn!(
                        inode,
                        previous = %entry.path,
                        path,
                        "Inode collision, replacing previous path"
                    );
                    entry.path = path.to_string();
                }
                entry.kind = kind;
                entry.nlookup.fetch_add(1, Ordering::Relaxed);
            })
            .or_insert_with(|| InodeEntry::new(path.to_string(), kind));
    }

    /// Returns the path and kind registered for `inode`.
    pub fn resolve(&self, inode: u64) -> Option<(String, NodeKind)> {
        self.entries
            .get(&inode)
            .map(|entry| (entry.path.clone(), entry.kind))
    }

    /// Drops `nlookup` kernel references to `inode`, evicting it at zero.
    ///
    /// The root is never evicted.
    pub fn forget(&self, inode: u64, nlookup: u64) {
        if inode == ROOT_INODE {
            return;
        }
        let evicted = self
            .entries
            .remove_if(&inode, |_, entry| {
                let old = entry.nlookup.fetch_sub(nlookup.min(entry.nlookup()), Ordering::AcqRel);
                old <= nlookup
            })
            .is_some();
        if evicted {
            trace!(inode, "Evicted inode");
        }
    }

    /// Number of registered inodes, including the root.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the root is always registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_inode_is_crc64_iso() {
        // Check value for the ISO polynomial
        assert_eq!(CRC64.checksum(b"123456789"), 0xB909_56C7_75A4_1001);
        assert_eq!(inode_for("123456789"), 0xB909_56C7_75A4_1001);
    }

    #[test]
    fn test_empty_path_never_aliases_root() {
        let inode = inode_for("");
        assert_ne!(inode, 0);
        assert_ne!(inode, ROOT_INODE);
    }

    #[test]
    fn test_distinct_realistic_paths() {
        let paths = [
            "secret",
            "secret/app",
            "secret/app/db",
            "secret/app/db/password",
            "secret/app/api",
            "secret/other",
            "secret/other/db",
        ];
        let mut inodes: Vec<_> = paths.iter().map(|p| inode_for(p)).collect();
        inodes.sort_unstable();
        inodes.dedup();
        assert_eq!(inodes.len(), paths.len());
    }

    #[test]
    fn test_table_registers_root() {
        let table = InodeTable::new("secret");
        assert_eq!(
            table.resolve(ROOT_INODE),
            Some(("secret".to_string(), NodeKind::Root))
        );
        table.forget(ROOT_INODE, 100);
        assert!(table.resolve(ROOT_INODE).is_some());
    }

    #[test]
    fn test_forget_evicts_at_zero() {
        let table = InodeTable::new("secret");
        let inode = inode_for("secret/a");
        table.remember(inode, "secret/a", NodeKind::Leaf);
        table.remember(inode, "secret/a", NodeKind::Leaf);
        assert_eq!(table.len(), 2);

        table.forget(inode, 1);
        assert!(table.resolve(inode).is_some());
        table.forget(inode, 1);
        assert!(table.resolve(inode).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_relookup_refreshes_kind() {
        let table = InodeTable::new("secret");
        let inode = inode_for("secret/a");
        table.remember(inode, "secret/a", NodeKind::Leaf);
        table.remember(inode, "secret/a", NodeKind::Collection);
        assert_eq!(
            table.resolve(inode),
            Some(("secret/a".to_string(), NodeKind::Collection))
        );
    }

    #[test]
    fn test_forget_unknown_inode_is_noop() {
        let table = InodeTable::new("secret");
        table.forget(42, 1);
        assert_eq!(table.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_inode_is_stable(path in "[a-z0-9/_-]{0,64}") {
            prop_assert_eq!(inode_for(&path), inode_for(&path.clone()));
            prop_assert_ne!(inode_for(&path), ROOT_INODE);
            prop_assert_ne!(inode_for(&path), 0);
        }
    }
}
