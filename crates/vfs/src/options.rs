//! Mount configuration.

use std::time::Duration;

/// Attribute and entry cache window handed to the kernel. The tree is
/// immutable for the mount's lifetime, so the window is effectively
/// unbounded.
pub const YEAR_LONG_CACHE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for a bundle mount.
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Owner uid stamped on every inode.
    pub uid: u32,
    /// Owner gid stamped on every inode.
    pub gid: u32,
    /// Kernel attribute/entry cache duration.
    pub cache_ttl: Duration,
    /// Filesystem name advertised to the kernel.
    pub fs_name: String,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            cache_ttl: YEAR_LONG_CACHE,
            fs_name: "datashed".to_string(),
        }
    }
}

impl MountOptions {
    /// Set the uid/gid stamped on every inode.
    ///
    /// # Arguments
    /// * `uid` - Owner uid
    /// * `gid` - Owner gid
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Set the kernel cache duration.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the advertised filesystem name.
    pub fn with_fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options: MountOptions = MountOptions::default();
        assert_eq!(options.uid, 0);
        assert_eq!(options.gid, 0);
        assert_eq!(options.cache_ttl, YEAR_LONG_CACHE);
    }

    #[test]
    fn test_builder() {
        let options: MountOptions = MountOptions::default()
            .with_owner(1000, 1000)
            .with_fs_name("bundles");
        assert_eq!(options.uid, 1000);
        assert_eq!(options.fs_name, "bundles");
    }
}
