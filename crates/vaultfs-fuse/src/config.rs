//! Mount configuration for the FUSE filesystem.

use std::time::Duration;

use fuser::MountOption;

/// Filesystem name shown in the mount table.
pub const DEFAULT_FS_NAME: &str = "vault";

/// Filesystem subtype shown in the mount table (`fuse.vaultfs`).
pub const DEFAULT_SUBTYPE: &str = "vaultfs";

/// Configuration options for the FUSE filesystem.
///
/// Kernel caching defaults to off so every access reaches the store.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Filesystem name in the mount table.
    pub fs_name: String,

    /// Filesystem subtype in the mount table.
    pub subtype: String,

    /// Let users other than the mounting user access the filesystem.
    ///
    /// Requires `user_allow_other` in `/etc/fuse.conf` for non-root users.
    pub allow_other: bool,

    /// Have the kernel unmount automatically when the process exits.
    ///
    /// Only honored together with `allow_other`.
    pub auto_unmount: bool,

    /// How long the kernel may cache attributes.
    ///
    /// Default: zero.
    pub attr_ttl: Duration,

    /// How long the kernel may cache name lookups.
    ///
    /// Default: zero.
    pub entry_ttl: Duration,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_name: DEFAULT_FS_NAME.to_string(),
            subtype: DEFAULT_SUBTYPE.to_string(),
            allow_other: false,
            auto_unmount: false,
            attr_ttl: Duration::ZERO,
            entry_ttl: Duration::ZERO,
        }
    }
}

impl MountConfig {
    /// Sets the filesystem name.
    #[must_use]
    pub fn fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }

    /// Allows other users to access the mount.
    #[must_use]
    pub fn allow_other(mut self, allow: bool) -> Self {
        self.allow_other = allow;
        self
    }

    /// Requests automatic unmount on process exit.
    #[must_use]
    pub fn auto_unmount(mut self, auto: bool) -> Self {
        self.auto_unmount = auto;
        self
    }

    /// Sets the kernel attribute cache TTL.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the kernel entry cache TTL.
    #[must_use]
    pub fn entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Options passed to the kernel when mounting.
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fs_name.clone()),
            MountOption::Subtype(self.subtype.clone()),
            MountOption::RO,
            MountOption::NoExec,
            MountOption::NoSuid,
            MountOption::NoDev,
            // Let the kernel enforce the read-only permission bits
            MountOption::DefaultPermissions,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
            if self.auto_unmount {
                options.push(MountOption::AutoUnmount);
            }
        }

        #[cfg(target_os = "macos")]
        options.push(MountOption::CUSTOM(format!("volname={}", self.fs_name)));

        options
    }
}
