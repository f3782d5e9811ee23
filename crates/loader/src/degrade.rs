//! Graceful degradation — picking the best available fallback.
//!
//! When a fetch fails or times out, the policy walks the fallback chain:
//! partial output from the failed operation, then the last cached answer
//! within the staleness bound, then the bundled minimal payload. It never
//! fails; the worst case is an empty minimal-fallback result.

use std::sync::Arc;
use std::time::Duration;

use sage_config::DegradationConfig;
use sage_core::cache::CacheStore;
use sage_core::error::LoadError;
use sage_core::model::{DegradationLevel, LoadRequest, LoadResult};
use tracing::{debug, warn};

/// Selects what to return when an attempt failed.
pub struct DegradationPolicy {
    cache: Arc<dyn CacheStore>,
    staleness_bound: Duration,
    fallback: Option<String>,
}

impl DegradationPolicy {
    pub fn new(cache: Arc<dyn CacheStore>, config: &DegradationConfig) -> Self {
        Self {
            cache,
            staleness_bound: config.staleness_bound(),
            fallback: Some(config.fallback().to_string()),
        }
    }

    /// Drop the minimal fallback payload. Startup validation rejects this
    /// configuration; the constructor exists so the empty-result edge stays
    /// testable.
    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    /// Resolve a failed attempt into the best available result.
    ///
    /// First match wins: partial output carried by a timeout signal, a
    /// cached answer no older than the staleness bound, the minimal
    /// fallback payload. Cache read errors are logged and treated as
    /// misses. Every result from this path has `complete == false`.
    pub async fn resolve(
        &self,
        failure: &LoadError,
        request: &LoadRequest,
        elapsed_ms: u64,
    ) -> LoadResult {
        let layer = request.layer;

        if let LoadError::Timeout(signal) = failure
            && let Some(partial) = &signal.partial
        {
            debug!(layer = %layer, bytes = partial.len(), "Degrading to partial output");
            return LoadResult::degraded(
                partial.as_str(),
                layer,
                DegradationLevel::Partial,
                elapsed_ms,
            )
            .with_error(failure.to_string());
        }

        let key = request.cache_key();
        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                let age_ms = entry.age_ms();
                if age_ms <= self.staleness_bound.as_millis() as u64 {
                    debug!(layer = %layer, age_ms, "Degrading to cached content");
                    return LoadResult::degraded(
                        entry.content,
                        layer,
                        DegradationLevel::StaleCache,
                        elapsed_ms,
                    )
                    .with_error(failure.to_string());
                }
                debug!(layer = %layer, age_ms, "Cached content too stale to serve");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(layer = %layer, error = %e, "Cache read failed during degradation");
            }
        }

        match &self.fallback {
            Some(fallback) => {
                debug!(layer = %layer, "Degrading to minimal fallback");
                LoadResult::degraded(
                    fallback.as_str(),
                    layer,
                    DegradationLevel::MinimalFallback,
                    elapsed_ms,
                )
                .with_error(failure.to_string())
            }
            None => {
                warn!(layer = %layer, "No fallback content configured; returning empty result");
                LoadResult::degraded("", layer, DegradationLevel::MinimalFallback, elapsed_ms)
                    .with_error(failure.to_string())
                    .with_error("no fallback content configured".to_string())
            }
        }
    }
}
