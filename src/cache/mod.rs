//! Persistent compute-once cache for crawl snapshots.
//!
//! Every entry is addressed by a `(namespace, key)` pair:
//!
//! ```text
//! region_list/regions        # enumerated regions (manual invalidation only)
//! region_links/{region}      # listing URLs of the last good crawl
//! region_details/{region}    # listing records matching those URLs
//! ```
//!
//! An entry, once written, is authoritative until it is explicitly
//! overwritten. [`MemoizingCache::get_or_compute`] never recomputes a present
//! entry, and a failed computation leaves no entry behind. Undecodable entries
//! are logged and treated as missing.

pub mod local;
pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// Re-export for convenience
pub use local::LocalCacheStore;
pub use memory::MemoryCacheStore;

/// Separates the kinds of snapshot data kept in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    RegionList,
    RegionLinks,
    RegionDetails,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::RegionList => "region_list",
            Namespace::RegionLinks => "region_links",
            Namespace::RegionDetails => "region_details",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value together with its address and write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub namespace: Namespace,
    pub key: String,
    pub value: V,
    pub last_written_at: DateTime<Utc>,
}

/// Storage backend holding opaque serialized entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the raw entry, `None` if it was never written.
    async fn load(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the raw entry.
    async fn store(&self, namespace: Namespace, key: &str, bytes: &[u8]) -> Result<()>;

    /// Delete the entry; deleting a missing entry is not an error.
    async fn remove(&self, namespace: Namespace, key: &str) -> Result<()>;
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Compute-once, persist-forever cache over a [`CacheStore`].
///
/// Operations on the same `(namespace, key)` are serialized through a per-key
/// lock, so concurrent callers of [`get_or_compute`](Self::get_or_compute) for
/// one key run the computation at most once. Different keys never contend.
pub struct MemoizingCache<S> {
    store: S,
    locks: Mutex<HashMap<(Namespace, String), KeyLock>>,
}

impl<S: CacheStore> MemoizingCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying storage backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock_for(&self, namespace: Namespace, key: &str) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry((namespace, key.to_string())).or_default())
    }

    async fn read_entry<V: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<CacheEntry<V>>> {
        let Some(bytes) = self.store.load(namespace, key).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<CacheEntry<V>>(&bytes) {
            Ok(entry) if entry.namespace == namespace && entry.key == key => Ok(Some(entry)),
            Ok(entry) => {
                log::warn!(
                    "Cache entry {}/{} is addressed as {}/{}; treating as missing",
                    namespace,
                    key,
                    entry.namespace,
                    entry.key
                );
                Ok(None)
            }
            Err(e) => {
                log::warn!(
                    "Cache entry {}/{} is corrupted ({}); treating as missing",
                    namespace,
                    key,
                    e
                );
                Ok(None)
            }
        }
    }

    async fn write_entry<V: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &V,
        written_at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = CacheEntry {
            namespace,
            key: key.to_string(),
            value,
            last_written_at: written_at,
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.store.store(namespace, key, &bytes).await
    }

    /// Read an entry without computing anything.
    pub async fn get<V: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<CacheEntry<V>>> {
        let lock = self.lock_for(namespace, key);
        let _guard = lock.lock().await;
        self.read_entry(namespace, key).await
    }

    /// Write time of an entry, regardless of its value type.
    pub async fn last_written_at(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get::<IgnoredAny>(namespace, key)
            .await?
            .map(|entry| entry.last_written_at))
    }

    /// Return the stored value, or compute, persist and return it.
    ///
    /// `compute` is not invoked when an entry exists, however old it is.
    /// Its errors propagate and leave no entry, so the next call retries.
    pub async fn get_or_compute<V, F, Fut>(
        &self,
        namespace: Namespace,
        key: &str,
        compute: F,
    ) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let lock = self.lock_for(namespace, key);
        let _guard = lock.lock().await;

        if let Some(entry) = self.read_entry::<V>(namespace, key).await? {
            log::debug!("Cache hit for {}/{}", namespace, key);
            return Ok(entry.value);
        }

        log::debug!("Cache miss for {}/{}; computing", namespace, key);
        let value = compute().await?;
        self.write_entry(namespace, key, &value, Utc::now()).await?;
        Ok(value)
    }

    /// Replace an entry unconditionally, stamping it with the current time.
    pub async fn overwrite<V: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &V,
    ) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        self.overwrite_at(namespace, key, value, now).await?;
        Ok(now)
    }

    /// Replace an entry with an explicit write time.
    pub async fn overwrite_at<V: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &V,
        written_at: DateTime<Utc>,
    ) -> Result<()> {
        let lock = self.lock_for(namespace, key);
        let _guard = lock.lock().await;
        self.write_entry(namespace, key, value, written_at).await
    }

    /// Drop an entry so the next `get_or_compute` recomputes it.
    pub async fn invalidate(&self, namespace: Namespace, key: &str) -> Result<()> {
        let lock = self.lock_for(namespace, key);
        let _guard = lock.lock().await;
        self.store.remove(namespace, key).await
    }
}
