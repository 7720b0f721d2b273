//! Filesystem nodes over a secret store.
//!
//! A [`Node`] is one addressable path in the mounted tree. Nodes are built
//! fresh for every kernel callback and hold nothing but their path, inode
//! and a store reference; every question asked of a node goes back to the
//! store.
//!
//! A path is a leaf when a point-read finds an entry there, and a
//! collection when the read finds nothing but a prefix-list does. Store
//! failures are never mistaken for absence.

use std::sync::Arc;

use vaultfs_core::{path, CollectionListing, ListingEntry, SecretStore};

use crate::error::{FuseError, FuseResult};
use crate::inode::{inode_for, ROOT_INODE};

/// Directory permissions (r-xr-xr-x).
pub const DIR_PERM: u16 = 0o555;

/// File permissions (r--r--r--).
pub const FILE_PERM: u16 = 0o444;

/// Owner and group of every node.
pub const OWNER_ID: u32 = 0;

/// What a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The mount root, at the configured store prefix.
    Root,
    /// A store path that only resolves through listing.
    Collection,
    /// A store path holding an entry.
    Leaf,
}

impl NodeKind {
    /// Returns true for directory-typed nodes.
    pub fn is_dir(self) -> bool {
        !matches!(self, NodeKind::Leaf)
    }
}

/// Attributes of a node, independent of the kernel bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttributes {
    /// Inode number.
    pub inode: u64,
    /// Node kind.
    pub kind: NodeKind,
    /// Permission bits; never writable.
    pub perm: u16,
    /// Link count.
    pub nlink: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Content length in bytes; zero for directories.
    pub size: u64,
}

/// One child produced by [`Node::list_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Display name, without trailing separator.
    pub name: String,
    /// Inode of the child's full path.
    pub inode: u64,
    /// [`NodeKind::Collection`] or [`NodeKind::Leaf`].
    pub kind: NodeKind,
}

/// Children of a directory node, in store order.
///
/// Inodes are computed as entries are iterated; [`iter`](Self::iter) can be
/// called any number of times and always yields the same sequence.
#[derive(Debug, Clone, Default)]
pub struct DirEntries {
    parent: String,
    listing: CollectionListing,
}

impl DirEntries {
    /// Iterates over the children in store order.
    pub fn iter(&self) -> impl Iterator<Item = DirEntry> + '_ {
        self.listing.iter().map(|entry| self.to_dir_entry(entry))
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.listing.len()
    }

    /// Returns true if the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.listing.is_empty()
    }

    fn to_dir_entry(&self, entry: &ListingEntry) -> DirEntry {
        DirEntry {
            name: entry.name().to_string(),
            inode: inode_for(&path::join(&self.parent, entry.name())),
            kind: if entry.is_collection() {
                NodeKind::Collection
            } else {
                NodeKind::Leaf
            },
        }
    }
}

/// One path in the mounted tree.
#[derive(Clone)]
pub struct Node {
    kind: NodeKind,
    path: String,
    inode: u64,
    store: Arc<dyn SecretStore>,
}

impl Node {
    /// The mount root, at store path `root`.
    pub fn root(store: Arc<dyn SecretStore>, root: &str) -> Self {
        Self {
            kind: NodeKind::Root,
            path: path::clean(root),
            inode: ROOT_INODE,
            store,
        }
    }

    /// Rebuilds a node from a path and kind recorded at lookup time.
    pub fn from_parts(store: Arc<dyn SecretStore>, kind: NodeKind, path: &str) -> Self {
        match kind {
            NodeKind::Root => Self::root(store, path),
            kind => Self {
                kind,
                path: path.to_string(),
                inode: inode_for(path),
                store,
            },
        }
    }

    /// Node kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Full store path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Inode number.
    pub fn inode(&self) -> u64 {
        self.inode
    }

    /// Attributes of this node.
    ///
    /// A leaf's size is the length of its canonical content, so this reads
    /// the entry from the store.
    pub fn attributes(&self) -> FuseResult<NodeAttributes> {
        let (perm, nlink, size) = if self.kind.is_dir() {
            (DIR_PERM, 2, 0)
        } else {
            (FILE_PERM, 1, self.read_content()?.len() as u64)
        };
        Ok(NodeAttributes {
            inode: self.inode,
            kind: self.kind,
            perm,
            nlink,
            uid: OWNER_ID,
            gid: OWNER_ID,
            size,
        })
    }

    /// Resolves the child `name` of a directory node.
    ///
    /// `name` must be a single path component; `.`, `..` and names
    /// containing a separator are rejected so lookups stay below the root.
    pub fn lookup_child(&self, name: &str) -> FuseResult<Node> {
        if !self.kind.is_dir() {
            return Err(FuseError::NotADirectory(self.path.clone()));
        }
        if matches!(name, "" | "." | "..") || name.contains(path::SEPARATOR) {
            return Err(FuseError::InvalidName);
        }
        let child = path::join(&self.path, name);

        let entry = self.store.read(&child).map_err(|source| FuseError::Store {
            path: child.clone(),
            source,
        })?;
        if entry.is_some() {
            return Ok(Self::from_parts(Arc::clone(&self.store), NodeKind::Leaf, &child));
        }

        let listing = self.store.list(&child).map_err(|source| FuseError::Store {
            path: child.clone(),
            source,
        })?;
        if listing.is_some() {
            return Ok(Self::from_parts(
                Arc::clone(&self.store),
                NodeKind::Collection,
                &child,
            ));
        }

        Err(FuseError::NotFound(child))
    }

    /// Lists the children of a directory node.
    ///
    /// A path the store knows nothing about lists as empty.
    pub fn list_children(&self) -> FuseResult<DirEntries> {
        if !self.kind.is_dir() {
            return Err(FuseError::NotADirectory(self.path.clone()));
        }
        let listing = self
            .store
            .list(&self.path)
            .map_err(|source| FuseError::Store {
                path: self.path.clone(),
                source,
            })?
            .unwrap_or_default();
        Ok(DirEntries {
            parent: self.path.clone(),
            listing,
        })
    }

    /// Canonical content of a leaf node.
    pub fn read_content(&self) -> FuseResult<Vec<u8>> {
        if self.kind.is_dir() {
            return Err(FuseError::IsADirectory(self.path.clone()));
        }
        let entry = self
            .store
            .read(&self.path)
            .map_err(|source| FuseError::Store {
                path: self.path.clone(),
                source,
            })?
            // Deleted since it was looked up
            .ok_or_else(|| FuseError::NotFound(self.path.clone()))?;
        entry.to_bytes().map_err(|source| FuseError::Store {
            path: self.path.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("inode", &self.inode)
            .finish_non_exhaustive()
    }
}
