//! FUSE filesystem over a secret store.
//!
//! This module implements the fuser `Filesystem` trait by translating every
//! callback into [`Node`] operations. The only state kept between callbacks
//! is the [`InodeTable`] name registry; attributes, listings and contents
//! are resolved from the store each time.
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | lookup | read, then list fallback; registers the inode |
//! | forget/batch_forget | drops lookup references, evicts at 0 |
//! | getattr | re-resolves; leaf size is the canonical content length |
//! | opendir/readdir | `.`, `..`, then children in store order |
//! | open | read-only, direct I/O, stateless handle |
//! | read | re-reads and slices the canonical content |
//!
//! Everything that would modify the tree falls through to fuser's default
//! `ENOSYS`; the mount itself is read-only.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen,
    Request,
};
use tracing::{debug, trace};
use vaultfs_core::{path, SecretStore};

use crate::config::MountConfig;
use crate::error::{FuseError, FuseResult};
use crate::inode::{inode_for, InodeTable, ROOT_INODE};
use crate::node::{Node, NodeAttributes, NodeKind};

/// Block size reported in attributes.
const BLOCK_SIZE: u32 = 4096;

/// File handle for every open; reads re-resolve by inode.
const STATELESS_FH: u64 = 0;

/// One `readdir` entry as handed to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    /// Inode number.
    pub inode: u64,
    /// Entry type.
    pub kind: FileType,
    /// Entry name.
    pub name: String,
}

/// FUSE filesystem exposing a secret store read-only.
pub struct SecretsFs {
    store: Arc<dyn SecretStore>,
    root: String,
    inodes: InodeTable,
    config: MountConfig,
    /// Reported as every timestamp; the store has no modification times.
    created: SystemTime,
}

impl SecretsFs {
    /// Creates a filesystem whose root is the store path `root`.
    pub fn new(store: Arc<dyn SecretStore>, root: &str, config: MountConfig) -> Self {
        let root = path::clean(root);
        Self {
            store,
            inodes: InodeTable::new(&root),
            root,
            config,
            created: SystemTime::now(),
        }
    }

    /// Store path of the mount root.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Rebuilds the node the kernel knows as `inode`.
    fn node(&self, inode: u64) -> FuseResult<Node> {
        let (path, kind) = self
            .inodes
            .resolve(inode)
            .ok_or(FuseError::InvalidInode(inode))?;
        Ok(Node::from_parts(Arc::clone(&self.store), kind, &path))
    }

    fn file_attr(&self, attrs: &NodeAttributes) -> FileAttr {
        FileAttr {
            ino: attrs.inode,
            size: attrs.size,
            blocks: attrs.size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: self.created,
            mtime: self.created,
            ctime: self.created,
            crtime: self.created,
            kind: if attrs.kind.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm: attrs.perm,
            nlink: attrs.nlink,
            uid: attrs.uid,
            gid: attrs.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Resolves `name` under `parent` and registers the result.
    pub fn lookup_entry(&self, parent: u64, name: &OsStr) -> FuseResult<FileAttr> {
        let name = name.to_str().ok_or(FuseError::InvalidName)?;
        let child = self.node(parent)?.lookup_child(name)?;
        let attr = self.file_attr(&child.attributes()?);
        self.inodes.remember(child.inode(), child.path(), child.kind());
        Ok(attr)
    }

    /// Attributes of `inode`.
    pub fn attributes(&self, inode: u64) -> FuseResult<FileAttr> {
        let attrs = self.node(inode)?.attributes()?;
        Ok(self.file_attr(&attrs))
    }

    /// Full directory listing of `inode`, starting with `.` and `..`.
    pub fn list_directory(&self, inode: u64) -> FuseResult<Vec<ListedEntry>> {
        let node = self.node(inode)?;
        let children = node.list_children()?;

        let mut entries = Vec::with_capacity(children.len() + 2);
        entries.push(ListedEntry {
            inode,
            kind: FileType::Directory,
            name: ".".to_string(),
        });
        entries.push(ListedEntry {
            inode: self.parent_inode(&node),
            kind: FileType::Directory,
            name: "..".to_string(),
        });
        entries.extend(children.iter().map(|child| ListedEntry {
            inode: child.inode,
            kind: if child.kind.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            name: child.name,
        }));
        Ok(entries)
    }

    fn parent_inode(&self, node: &Node) -> u64 {
        if node.kind() == NodeKind::Root {
            return ROOT_INODE;
        }
        match node.path().rsplit_once('/') {
            Some((parent, _)) if parent != self.root => inode_for(parent),
            _ => ROOT_INODE,
        }
    }

    /// Checks that `inode` can be opened with `flags` and returns the open flags.
    pub fn open_file(&self, inode: u64, flags: i32) -> FuseResult<u32> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY || flags & libc::O_TRUNC != 0 {
            return Err(FuseError::ReadOnly);
        }
        let node = self.node(inode)?;
        if node.kind().is_dir() {
            return Err(FuseError::IsADirectory(node.path().to_string()));
        }
        Ok(fuser::consts::FOPEN_DIRECT_IO)
    }

    /// Up to `size` bytes of the content of `inode`, starting at `offset`.
    pub fn read_range(&self, inode: u64, offset: u64, size: u32) -> FuseResult<Vec<u8>> {
        let content = self.node(inode)?.read_content()?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(content.len());
        let end = start.saturating_add(size as usize).min(content.len());
        Ok(content[start..end].to_vec())
    }

    fn entry_ttl(&self) -> Duration {
        self.config.entry_ttl
    }

    fn attr_ttl(&self) -> Duration {
        self.config.attr_ttl
    }
}

impl Filesystem for SecretsFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!(parent, name = ?name, "lookup");
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&self.entry_ttl(), &attr, 0),
            Err(e) => {
                debug!(parent, name = ?name, error = %e, "lookup failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn batch_forget(&mut self, _req: &Request<'_>, nodes: &[fuser::fuse_forget_one]) {
        trace!(count = nodes.len(), "batch_forget");
        for node in nodes {
            self.inodes.forget(node.nodeid, node.nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        match self.attributes(ino) {
            Ok(attr) => reply.attr(&self.attr_ttl(), &attr),
            Err(e) => {
                debug!(inode = ino, error = %e, "getattr failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags, "open");
        match self.open_file(ino, flags) {
            Ok(open_flags) => reply.opened(STATELESS_FH, open_flags),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, offset, size, "read");
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.read_range(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                debug!(inode = ino, error = %e, "read failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "opendir");
        match self.node(ino) {
            Ok(node) if node.kind().is_dir() => reply.opened(STATELESS_FH, 0),
            Ok(node) => reply.error(FuseError::NotADirectory(node.path().to_string()).to_errno()),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, offset, "readdir");
        let entries = match self.list_directory(ino) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(inode = ino, error = %e, "readdir failed");
                reply.error(e.to_errno());
                return;
            }
        };

        // Offsets are entry indices; the offset handed to the kernel for an
        // entry is the index of the one after it.
        let skip = usize::try_from(offset).unwrap_or(0);
        for (index, entry) in entries.iter().enumerate().skip(skip) {
            let next = i64::try_from(index + 1).unwrap_or(i64::MAX);
            if reply.add(entry.inode, next, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vaultfs_core::testing::MemoryStore;

    fn fs_with(store: &Arc<MemoryStore>) -> SecretsFs {
        SecretsFs::new(
            Arc::clone(store) as Arc<dyn SecretStore>,
            "secret",
            MountConfig::default(),
        )
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::new()
                .with("secret/app/db", [("user", json!("admin")), ("pass", json!("x"))])
                .with("secret/app/api", [("key", json!("abc"))])
                .with("secret/top", [("value", json!(true))]),
        )
    }

    #[test]
    fn test_root_attributes() {
        let store = store();
        let fs = fs_with(&store);
        let attr = fs.attributes(ROOT_INODE).unwrap();
        assert_eq!(attr.ino, ROOT_INODE);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o555);
        assert_eq!((attr.uid, attr.gid), (0, 0));
    }

    #[test]
    fn test_lookup_registers_inode() {
        let store = store();
        let fs = fs_with(&store);

        let app = fs.lookup_entry(ROOT_INODE, OsStr::new("app")).unwrap();
        assert_eq!(app.kind, FileType::Directory);
        assert_eq!(app.ino, inode_for("secret/app"));

        let db = fs.lookup_entry(app.ino, OsStr::new("db")).unwrap();
        assert_eq!(db.kind, FileType::RegularFile);
        assert_eq!(db.perm, 0o444);
        assert_eq!(db.nlink, 1);

        let content = fs.read_range(db.ino, 0, 4096).unwrap();
        assert_eq!(db.size, content.len() as u64);
        assert_eq!(db.blocks, 1);
    }

    #[test]
    fn test_unknown_inode() {
        let store = store();
        let fs = fs_with(&store);
        let err = fs.attributes(12345).unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_forgotten_inode_is_unknown() {
        let store = store();
        let fs = fs_with(&store);
        let top = fs.lookup_entry(ROOT_INODE, OsStr::new("top")).unwrap();
        fs.inodes.forget(top.ino, 1);
        assert!(matches!(
            fs.attributes(top.ino),
            Err(FuseError::InvalidInode(_))
        ));
    }

    #[test]
    fn test_list_directory_includes_dot_entries() {
        let store = store();
        let fs = fs_with(&store);
        let entries = fs.list_directory(ROOT_INODE).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, [".", "..", "app", "top"]);
        assert_eq!(entries[0].inode, ROOT_INODE);
        assert_eq!(entries[1].inode, ROOT_INODE);
        assert_eq!(entries[2].kind, FileType::Directory);
        assert_eq!(entries[3].kind, FileType::RegularFile);
        assert_eq!(entries[3].inode, inode_for("secret/top"));
    }

    #[test]
    fn test_nested_directory_parent_inode() {
        let store = Arc::new(MemoryStore::new().with("secret/a/b/c", [("v", json!(1))]));
        let fs = fs_with(&store);
        let a = fs.lookup_entry(ROOT_INODE, OsStr::new("a")).unwrap();
        let b = fs.lookup_entry(a.ino, OsStr::new("b")).unwrap();

        let in_a = fs.list_directory(a.ino).unwrap();
        assert_eq!(in_a[1].inode, ROOT_INODE);
        let in_b = fs.list_directory(b.ino).unwrap();
        assert_eq!(in_b[1].inode, a.ino);
    }

    #[test]
    fn test_open_rejects_writes_and_directories() {
        let store = store();
        let fs = fs_with(&store);
        let top = fs.lookup_entry(ROOT_INODE, OsStr::new("top")).unwrap();

        assert_eq!(
            fs.open_file(top.ino, libc::O_RDONLY).unwrap(),
            fuser::consts::FOPEN_DIRECT_IO
        );
        assert_eq!(fs.open_file(top.ino, libc::O_WRONLY).unwrap_err().to_errno(), libc::EROFS);
        assert_eq!(fs.open_file(top.ino, libc::O_RDWR).unwrap_err().to_errno(), libc::EROFS);
        assert_eq!(
            fs.open_file(ROOT_INODE, libc::O_RDONLY).unwrap_err().to_errno(),
            libc::EISDIR
        );
    }

    #[test]
    fn test_read_range_slices_content() {
        let store = store();
        let fs = fs_with(&store);
        let top = fs.lookup_entry(ROOT_INODE, OsStr::new("top")).unwrap();
        let full = fs.read_range(top.ino, 0, 4096).unwrap();
        assert_eq!(full, b"{\n  \"value\": true\n}\n");

        assert_eq!(fs.read_range(top.ino, 2, 7).unwrap(), b"  \"valu");
        assert!(fs.read_range(top.ino, 1000, 10).unwrap().is_empty());
    }

    #[test]
    fn test_read_sees_store_updates() {
        let store = store();
        let fs = fs_with(&store);
        let top = fs.lookup_entry(ROOT_INODE, OsStr::new("top")).unwrap();
        store.insert("secret/top", [("value", json!(false))]);
        assert_eq!(
            fs.read_range(top.ino, 0, 4096).unwrap(),
            b"{\n  \"value\": false\n}\n"
        );
    }

    #[test]
    fn test_store_outage_is_eio() {
        let store = store();
        let fs = fs_with(&store);
        let top = fs.lookup_entry(ROOT_INODE, OsStr::new("top")).unwrap();
        store.set_unavailable(true);
        assert_eq!(fs.attributes(top.ino).unwrap_err().to_errno(), libc::EIO);
        assert_eq!(fs.list_directory(ROOT_INODE).unwrap_err().to_errno(), libc::EIO);
        assert_eq!(
            fs.lookup_entry(ROOT_INODE, OsStr::new("app")).unwrap_err().to_errno(),
            libc::EIO
        );
    }

    #[test]
    fn test_root_prefix_is_cleaned() {
        let store = store();
        let fs = SecretsFs::new(
            Arc::clone(&store) as Arc<dyn SecretStore>,
            "/secret/",
            MountConfig::default(),
        );
        assert_eq!(fs.root(), "secret");
        assert!(fs.lookup_entry(ROOT_INODE, OsStr::new("top")).is_ok());
    }
}
