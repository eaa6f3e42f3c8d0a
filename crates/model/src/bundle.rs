//! Bundle descriptor and entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file recorded in a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Path of the entry relative to the bundle root, POSIX separators.
    pub name_with_path: String,
    /// Root key (hex) of the entry's content in the blob store. Empty for
    /// directory entries, which carry no content.
    #[serde(default)]
    pub hash: String,
    /// POSIX file mode bits.
    pub file_mode: u32,
    /// Content size in bytes.
    pub size: u64,
}

impl BundleEntry {
    /// Create a file entry.
    ///
    /// # Arguments
    /// * `name_with_path` - Bundle-relative path
    /// * `hash` - Hex root key of the file content
    /// * `size` - Content size in bytes
    pub fn file(
        name_with_path: impl Into<String>,
        hash: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            name_with_path: name_with_path.into(),
            hash: hash.into(),
            file_mode: 0o444,
            size,
        }
    }

    /// Whether this entry describes a directory.
    pub fn is_dir(&self) -> bool {
        self.hash.is_empty()
    }
}

/// An immutable snapshot of a file set in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// Bundle id, unique within its repo.
    pub id: String,
    /// Commit time; also stamped onto every inode of a mounted bundle.
    pub timestamp: DateTime<Utc>,
    /// Commit message.
    #[serde(default)]
    pub message: String,
    /// Who recorded the bundle.
    #[serde(default)]
    pub contributor: String,
    /// Ids of the bundles this one was derived from.
    #[serde(default)]
    pub parents: Vec<String>,
    /// File list, in the order entries were recorded. This order is stable
    /// for a given bundle and drives deterministic inode assignment.
    #[serde(default)]
    pub entries: Vec<BundleEntry>,
}

impl BundleDescriptor {
    /// Create a descriptor with no entries.
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            message: String::new(),
            contributor: String::new(),
            parents: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Set the commit message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the contributor.
    pub fn with_contributor(mut self, contributor: impl Into<String>) -> Self {
        self.contributor = contributor.into();
        self
    }

    /// Set the parent bundle ids.
    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    /// Append a file entry.
    pub fn with_entry(mut self, entry: BundleEntry) -> Self {
        self.entries.push(entry);
        self
    }
}
