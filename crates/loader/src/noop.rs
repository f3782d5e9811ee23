//! No-op cache store — disables the stale-cache degradation tier.

use async_trait::async_trait;
use sage_core::cache::{CacheStore, CachedContent};
use sage_core::error::CacheError;

/// A cache store that remembers nothing.
pub struct NoopCache;

#[async_trait]
impl CacheStore for NoopCache {
    fn name(&self) -> &str {
        "noop"
    }

    async fn get(&self, _key: &str) -> Result<Option<CachedContent>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _content: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
