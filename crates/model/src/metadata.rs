//! Metadata-store layout for bundle descriptors.
//!
//! Descriptors are JSON documents under deterministic keys:
//!
//! ```text
//! repos/{repo}/bundles/{bundle_id}/bundle.json
//! repos/{repo}/latest
//! ```
//!
//! The `latest` object holds the id of the most recently written bundle.

use datashed_store::{ObjectStore, WriteMode};

use crate::bundle::BundleDescriptor;
use crate::error::ModelError;

/// Metadata key of a bundle descriptor.
pub fn bundle_descriptor_key(repo: &str, bundle_id: &str) -> String {
    format!("repos/{}/bundles/{}/bundle.json", repo, bundle_id)
}

/// Metadata key of a repo's latest-bundle pointer.
pub fn latest_bundle_key(repo: &str) -> String {
    format!("repos/{}/latest", repo)
}

/// Repo and bundle names become metadata key segments, so they must be
/// non-empty and separator-free.
fn validate_name(name: &str) -> Result<(), ModelError> {
    if name.is_empty() {
        return Err(ModelError::InvalidName {
            name: name.to_string(),
            message: "empty name".to_string(),
        });
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(ModelError::InvalidName {
            name: name.to_string(),
            message: "name must not contain path separators".to_string(),
        });
    }
    Ok(())
}

/// Write a bundle descriptor and advance the repo's latest pointer to it.
pub async fn write_bundle(
    store: &dyn ObjectStore,
    repo: &str,
    descriptor: &BundleDescriptor,
) -> Result<(), ModelError> {
    validate_name(repo)?;
    validate_name(&descriptor.id)?;

    let encoded: Vec<u8> =
        serde_json::to_vec_pretty(descriptor).map_err(|e| ModelError::InvalidDescriptor {
            repo: repo.to_string(),
            bundle: descriptor.id.clone(),
            message: e.to_string(),
        })?;

    store
        .put(
            &bundle_descriptor_key(repo, &descriptor.id),
            &encoded,
            WriteMode::Overwrite,
        )
        .await?;
    set_latest_bundle(store, repo, &descriptor.id).await
}

/// Point the repo's latest pointer at `bundle_id`.
pub async fn set_latest_bundle(
    store: &dyn ObjectStore,
    repo: &str,
    bundle_id: &str,
) -> Result<(), ModelError> {
    validate_name(repo)?;
    validate_name(bundle_id)?;
    store
        .put(
            &latest_bundle_key(repo),
            bundle_id.as_bytes(),
            WriteMode::Overwrite,
        )
        .await?;
    Ok(())
}

/// Read a bundle descriptor by id.
pub async fn read_bundle(
    store: &dyn ObjectStore,
    repo: &str,
    bundle_id: &str,
) -> Result<BundleDescriptor, ModelError> {
    validate_name(repo)?;
    validate_name(bundle_id)?;

    let key: String = bundle_descriptor_key(repo, bundle_id);
    let raw: Vec<u8> = match store.get(&key).await {
        Ok(raw) => raw,
        Err(e) if e.is_not_found() => {
            return Err(ModelError::BundleNotFound {
                repo: repo.to_string(),
                bundle: bundle_id.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&raw).map_err(|e| ModelError::InvalidDescriptor {
        repo: repo.to_string(),
        bundle: bundle_id.to_string(),
        message: e.to_string(),
    })
}

/// Resolve the id of a repo's most recently written bundle.
pub async fn get_latest_bundle(repo: &str, store: &dyn ObjectStore) -> Result<String, ModelError> {
    validate_name(repo)?;

    let raw: Vec<u8> = match store.get(&latest_bundle_key(repo)).await {
        Ok(raw) => raw,
        Err(e) if e.is_not_found() => {
            return Err(ModelError::NoLatestBundle {
                repo: repo.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let id: String = String::from_utf8_lossy(&raw).trim().to_string();
    if id.is_empty() {
        return Err(ModelError::NoLatestBundle {
            repo: repo.to_string(),
        });
    }
    Ok(id)
}

/// Read a bundle descriptor, resolving the latest bundle when no id is
/// given.
pub async fn resolve_bundle(
    store: &dyn ObjectStore,
    repo: &str,
    bundle_id: Option<&str>,
) -> Result<BundleDescriptor, ModelError> {
    match bundle_id {
        Some(id) if !id.is_empty() => read_bundle(store, repo, id).await,
        _ => {
            let latest: String = get_latest_bundle(repo, store).await?;
            read_bundle(store, repo, &latest).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use datashed_store::MemoryStore;

    use crate::bundle::BundleEntry;

    fn descriptor(id: &str) -> BundleDescriptor {
        BundleDescriptor::new(id, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
            .with_entry(BundleEntry::file("a.txt", "00ff", 4))
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            bundle_descriptor_key("demo", "b1"),
            "repos/demo/bundles/b1/bundle.json"
        );
        assert_eq!(latest_bundle_key("demo"), "repos/demo/latest");
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let store = MemoryStore::new();
        let bundle: BundleDescriptor = descriptor("b1");

        write_bundle(&store, "demo", &bundle).await.unwrap();
        let read: BundleDescriptor = read_bundle(&store, "demo", "b1").await.unwrap();
        assert_eq!(read, bundle);
    }

    #[tokio::test]
    async fn test_latest_tracks_most_recent_write() {
        let store = MemoryStore::new();
        write_bundle(&store, "demo", &descriptor("b1")).await.unwrap();
        write_bundle(&store, "demo", &descriptor("b2")).await.unwrap();

        assert_eq!(get_latest_bundle("demo", &store).await.unwrap(), "b2");

        let resolved: BundleDescriptor = resolve_bundle(&store, "demo", None).await.unwrap();
        assert_eq!(resolved.id, "b2");

        let pinned: BundleDescriptor = resolve_bundle(&store, "demo", Some("b1")).await.unwrap();
        assert_eq!(pinned.id, "b1");
    }

    #[tokio::test]
    async fn test_missing_bundle_and_empty_repo() {
        let store = MemoryStore::new();
        assert!(matches!(
            read_bundle(&store, "demo", "nope").await.unwrap_err(),
            ModelError::BundleNotFound { .. }
        ));
        assert!(matches!(
            get_latest_bundle("demo", &store).await.unwrap_err(),
            ModelError::NoLatestBundle { .. }
        ));
    }

    #[tokio::test]
    async fn test_rejects_separator_names() {
        let store = MemoryStore::new();
        assert!(matches!(
            read_bundle(&store, "a/b", "x").await.unwrap_err(),
            ModelError::InvalidName { .. }
        ));
        assert!(matches!(
            get_latest_bundle("", &store).await.unwrap_err(),
            ModelError::InvalidName { .. }
        ));
    }
}
