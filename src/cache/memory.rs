//! In-memory cache store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::cache::{CacheStore, Namespace};
use crate::error::Result;

/// Volatile cache store, useful for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<(Namespace, String), Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&(namespace, key.to_string())).cloned())
    }

    async fn store(&self, namespace: Namespace, key: &str, bytes: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert((namespace, key.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, namespace: Namespace, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&(namespace, key.to_string()));
        Ok(())
    }
}
