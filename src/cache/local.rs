//! Local filesystem cache store.
//!
//! One JSON file per entry, written atomically:
//!
//! ```text
//! {root}/
//! ├── region_list/
//! │   └── regions.json
//! ├── region_links/
//! │   └── {region}.json
//! └── region_details/
//!     └── {region}.json
//! ```
//!
//! Keys that are not filename-safe are stored under their SHA-256 digest.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::cache::{CacheStore, Namespace};
use crate::error::{AppError, Result};
use crate::utils::fs::{read_optional, write_atomic};

/// Filesystem-backed cache store.
#[derive(Debug, Clone)]
pub struct LocalCacheStore {
    root_dir: PathBuf,
}

impl LocalCacheStore {
    /// Create a new store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// File name stem for a key.
    fn file_stem(key: &str) -> String {
        let safe = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if safe {
            key.to_string()
        } else {
            hex::encode(Sha256::digest(key.as_bytes()))
        }
    }

    /// Get the full path of an entry.
    fn path(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.root_dir
            .join(namespace.as_str())
            .join(format!("{}.json", Self::file_stem(key)))
    }
}

#[async_trait]
impl CacheStore for LocalCacheStore {
    async fn load(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&self.path(namespace, key))
            .await
            .map_err(|e| AppError::cache(namespace, key, e))
    }

    async fn store(&self, namespace: Namespace, key: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.path(namespace, key), bytes)
            .await
            .map_err(|e| AppError::cache(namespace, key, e))
    }

    async fn remove(&self, namespace: Namespace, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(namespace, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::cache(namespace, key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoizingCache;
    use tempfile::TempDir;

    #[test]
    fn test_file_stem() {
        assert_eq!(LocalCacheStore::file_stem("zurich"), "zurich");
        assert_eq!(LocalCacheStore::file_stem("st_gallen-1"), "st_gallen-1");

        let hashed = LocalCacheStore::file_stem("../etc/passwd");
        assert_eq!(hashed.len(), 64);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_store_load_remove() {
        let tmp = TempDir::new().unwrap();
        let store = LocalCacheStore::new(tmp.path());

        store
            .store(Namespace::RegionLinks, "zurich", b"[]")
            .await
            .unwrap();
        assert!(tmp.path().join("region_links/zurich.json").exists());
        assert_eq!(
            store.load(Namespace::RegionLinks, "zurich").await.unwrap(),
            Some(b"[]".to_vec())
        );

        store.remove(Namespace::RegionLinks, "zurich").await.unwrap();
        assert!(
            store
                .load(Namespace::RegionLinks, "zurich")
                .await
                .unwrap()
                .is_none()
        );
        // Removing twice is fine.
        store.remove(Namespace::RegionLinks, "zurich").await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let tmp = TempDir::new().unwrap();

        let cache = MemoizingCache::new(LocalCacheStore::new(tmp.path()));
        cache
            .overwrite(Namespace::RegionDetails, "Basel Stadt", &vec![1u32, 2, 3])
            .await
            .unwrap();
        drop(cache);

        let reopened = MemoizingCache::new(LocalCacheStore::new(tmp.path()));
        let entry = reopened
            .get::<Vec<u32>>(Namespace::RegionDetails, "Basel Stadt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.value, vec![1, 2, 3]);
        assert_eq!(entry.key, "Basel Stadt");
    }
}
