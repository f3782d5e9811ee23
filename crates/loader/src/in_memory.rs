//! In-memory cache store — useful for testing and single-process deployments.

use async_trait::async_trait;
use sage_core::cache::{CacheStore, CachedContent};
use sage_core::error::CacheError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A cache store that keeps the last successful content per key in a map.
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CachedContent>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of cached keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CachedContent>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, content: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), CachedContent::new(content));
        Ok(())
    }
}
