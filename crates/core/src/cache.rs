//! Cache store trait — last-known-good content for degraded loads.
//!
//! The loader writes successful results through to the cache; the
//! degradation policy reads them back when the backend fails. How entries
//! are persisted is an implementation concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// A cached content entry with its write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedContent {
    pub content: String,
    pub cached_at: DateTime<Utc>,
}

impl CachedContent {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            cached_at: Utc::now(),
        }
    }

    /// Age of this entry in milliseconds, saturating at zero for clock skew.
    pub fn age_ms(&self) -> u64 {
        (Utc::now() - self.cached_at).num_milliseconds().max(0) as u64
    }
}

/// A store of last-successful content per request key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// A human-readable name for this store (e.g. "memory", "noop").
    fn name(&self) -> &str;

    /// Look up the cached entry for a request key.
    async fn get(&self, key: &str) -> Result<Option<CachedContent>, CacheError>;

    /// Write the latest successful content for a request key.
    async fn put(&self, key: &str, content: &str) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_age_is_small() {
        let entry = CachedContent::new("content");
        assert!(entry.age_ms() < 1000);
    }

    #[test]
    fn backdated_entry_ages() {
        let entry = CachedContent {
            content: "old".into(),
            cached_at: Utc::now() - chrono::Duration::seconds(90),
        };
        assert!(entry.age_ms() >= 90_000);
    }
}
