//! The knowledge loader — breaker-guarded, deadline-bounded orchestration.
//!
//! `get` answers "load knowledge for this layer/topic within its budget" and
//! always returns a structured result: full content when the backend
//! cooperates, the best degraded answer otherwise. `try_get` is the strict
//! surface where failures propagate instead.

use std::sync::Arc;
use std::time::Duration;

use sage_config::CoreConfig;
use sage_core::cache::CacheStore;
use sage_core::error::LoadError;
use sage_core::event::{Event, topics};
use sage_core::model::{Layer, LoadRequest, LoadResult};
use sage_core::source::{Content, KnowledgeSource, PartialSink};
use sage_events::EventBus;
use sage_resilience::{BreakerRegistry, Budget, TimeoutManager};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::degrade::DegradationPolicy;
use crate::in_memory::MemoryCache;

/// Orchestrates timeout-managed, breaker-guarded knowledge loads.
pub struct KnowledgeLoader {
    source: Arc<dyn KnowledgeSource>,
    cache: Arc<dyn CacheStore>,
    timeouts: TimeoutManager,
    breakers: BreakerRegistry,
    events: Arc<EventBus>,
    policy: DegradationPolicy,
    degradation_cfg: sage_config::DegradationConfig,
    strict: bool,
}

impl KnowledgeLoader {
    /// Build a loader over a content backend, wiring the event bus, breaker
    /// registry, timeout manager, and an in-memory cache from configuration.
    pub fn new(source: Arc<dyn KnowledgeSource>, config: &CoreConfig) -> Self {
        let events = Arc::new(
            EventBus::new().with_handler_timeout(config.events.handler_timeout()),
        );
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());

        Self {
            timeouts: TimeoutManager::new(config.timeouts.clone()),
            breakers: BreakerRegistry::new(config.breaker.clone()).with_events(events.clone()),
            policy: DegradationPolicy::new(cache.clone(), &config.degradation),
            degradation_cfg: config.degradation.clone(),
            cache,
            source,
            events,
            strict: config.strict,
        }
    }

    /// Swap the cache store (e.g. for a persistent one, or `NoopCache`).
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.policy = DegradationPolicy::new(cache.clone(), &self.degradation_cfg);
        self.cache = cache;
        self
    }

    /// The bus carrying `source.*` and `circuit.*` lifecycle events.
    /// Subscribers are read-only observers.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The breaker registry, for state inspection and explicit resets.
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Whether this deployment asked for strict (propagating) semantics.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Load knowledge, degrading on failure. Never fails, never hangs past
    /// the request budget plus a small fixed overhead.
    pub async fn get(&self, request: LoadRequest) -> LoadResult {
        let budget = self.request_budget(&request);
        self.get_with_budget(request, budget).await
    }

    /// Load several layers under one shared outer budget.
    ///
    /// Layers load sequentially; each inner fetch is bounded by
    /// `min(its tier duration, outer remaining)`, so the whole batch
    /// respects `deadline_ms` even when early layers eat into it. Layers
    /// reached after the budget ran dry degrade like any other timeout.
    pub async fn get_batch(&self, layers: &[Layer], deadline_ms: u64) -> Vec<LoadResult> {
        let outer = Budget::from_millis(deadline_ms);
        let mut results = Vec::with_capacity(layers.len());
        for &layer in layers {
            let budget = self.timeouts.nested(&outer, layer.default_tier());
            results.push(self.get_with_budget(LoadRequest::layer(layer), budget).await);
        }
        results
    }

    /// Load knowledge with degradation disabled: the first timeout,
    /// circuit-open, or backend error propagates to the caller.
    pub async fn try_get(&self, request: LoadRequest) -> Result<LoadResult, LoadError> {
        let started = Instant::now();
        let budget = self.request_budget(&request);
        self.publish_start(&request).await;

        match self.fetch_guarded(&request, budget).await {
            Ok(content) => Ok(self.complete(&request, content, started).await),
            Err(err) => {
                self.publish_degraded(&request, &err).await;
                Err(err)
            }
        }
    }

    /// The effective budget for a request: the layer tier's duration,
    /// capped by the caller's deadline when one is given.
    fn request_budget(&self, request: &LoadRequest) -> Budget {
        let mut budget = self.timeouts.budget(request.layer.default_tier());
        if let Some(deadline_ms) = request.deadline_ms {
            let cap = Duration::from_millis(deadline_ms);
            if cap < budget.limit() {
                budget = Budget::from_duration(cap);
            }
        }
        budget
    }

    async fn get_with_budget(&self, request: LoadRequest, budget: Budget) -> LoadResult {
        let started = Instant::now();
        self.publish_start(&request).await;

        match self.fetch_guarded(&request, budget).await {
            Ok(content) => self.complete(&request, content, started).await,
            Err(err) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                debug!(layer = %request.layer, kind = err.kind(), "Load failed; degrading");
                self.publish_degraded(&request, &err).await;
                self.policy.resolve(&err, &request, elapsed_ms).await
            }
        }
    }

    /// The guarded fetch shared by both surfaces:
    /// `breaker(timeout_manager(fetch))`.
    async fn fetch_guarded(
        &self,
        request: &LoadRequest,
        budget: Budget,
    ) -> Result<Content, LoadError> {
        let partial = PartialSink::new();
        let breaker = self.breakers.get_or_create(&request.layer.operation_class());

        let source = self.source.clone();
        let layer = request.layer;
        let topic = request.topic.clone();
        let op_sink = partial.clone();
        breaker
            .call(self.timeouts.run(budget, partial, async move {
                let content = source.fetch(layer, topic.as_deref(), &op_sink).await?;
                Ok(content)
            }))
            .await
    }

    async fn complete(
        &self,
        request: &LoadRequest,
        content: Content,
        started: Instant,
    ) -> LoadResult {
        let key = request.cache_key();
        if let Err(e) = self.cache.put(&key, &content.body).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = LoadResult::full(content.body, request.layer, elapsed_ms);
        self.events
            .publish(
                Event::new(topics::LOAD_COMPLETE)
                    .with("layer", json!(request.layer))
                    .with("elapsed_ms", json!(result.elapsed_ms))
                    .with("tokens", json!(result.tokens)),
            )
            .await;
        result
    }

    async fn publish_start(&self, request: &LoadRequest) {
        self.events
            .publish(
                Event::new(topics::LOAD_START)
                    .with("layer", json!(request.layer))
                    .with("topic", json!(request.topic))
                    .with("deadline_ms", json!(request.deadline_ms)),
            )
            .await;
    }

    async fn publish_degraded(&self, request: &LoadRequest, err: &LoadError) {
        self.events
            .publish(
                Event::new(topics::LOAD_DEGRADED)
                    .with("layer", json!(request.layer))
                    .with("kind", json!(err.kind()))
                    .with("error", json!(err.to_string())),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sage_core::error::SourceError;
    use sage_core::model::{DegradationLevel, MINIMAL_FALLBACK};
    use sage_resilience::CircuitState;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the stub backend should do on the next fetch.
    #[derive(Clone)]
    enum Behavior {
        Answer(String),
        Fail,
        Hang,
        HangAfterPartial(String),
    }

    struct StubSource {
        behavior: Mutex<Behavior>,
        fetches: AtomicUsize,
    }

    impl StubSource {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior: Mutex::new(behavior),
                fetches: AtomicUsize::new(0),
            })
        }

        fn answering(content: &str) -> Arc<Self> {
            Self::new(Behavior::Answer(content.into()))
        }

        fn set(&self, behavior: Behavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KnowledgeSource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        async fn fetch(
            &self,
            layer: Layer,
            _topic: Option<&str>,
            partial: &PartialSink,
        ) -> Result<Content, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                Behavior::Answer(content) => Ok(Content::new(content)),
                Behavior::Fail => Err(SourceError::NotFound {
                    layer: layer.to_string(),
                    topic: None,
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Content::new("too late"))
                }
                Behavior::HangAfterPartial(chunk) => {
                    partial.push(&chunk);
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Content::new("too late"))
                }
            }
        }
    }

    fn loader(source: Arc<StubSource>) -> KnowledgeLoader {
        KnowledgeLoader::new(source, &CoreConfig::default())
    }

    #[tokio::test]
    async fn healthy_fetch_returns_full_result() {
        let source = StubSource::answering("# Core principles");
        let result = loader(source).get(LoadRequest::layer(Layer::Core)).await;

        assert!(result.complete);
        assert_eq!(result.degradation, DegradationLevel::Full);
        assert_eq!(result.content, "# Core principles");
        assert!(result.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_fetch_degrades_within_budget() {
        let source = StubSource::new(Behavior::Hang);
        let started = Instant::now();
        // Core loads under T2 (500ms)
        let result = loader(source).get(LoadRequest::layer(Layer::Core)).await;

        assert!(started.elapsed() < Duration::from_millis(600));
        assert!(!result.complete);
        assert_eq!(result.degradation, DegradationLevel::MinimalFallback);
        assert_eq!(result.content, MINIMAL_FALLBACK);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_output_survives_a_timeout() {
        let source = StubSource::new(Behavior::HangAfterPartial("# Streamed so far\n".into()));
        let result = loader(source).get(LoadRequest::layer(Layer::Core)).await;

        assert!(!result.complete);
        assert_eq!(result.degradation, DegradationLevel::Partial);
        assert_eq!(result.content, "# Streamed so far\n");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cache_serves_after_backend_breaks() {
        let source = StubSource::answering("cached while healthy");
        let loader = loader(source.clone());

        let first = loader.get(LoadRequest::layer(Layer::Core)).await;
        assert!(first.complete);

        source.set(Behavior::Fail);
        let second = loader.get(LoadRequest::layer(Layer::Core)).await;

        assert!(!second.complete);
        assert_eq!(second.degradation, DegradationLevel::StaleCache);
        assert_eq!(second.content, "cached while healthy");
    }

    #[tokio::test]
    async fn breaker_opens_and_skips_the_backend() {
        let source = StubSource::new(Behavior::Fail);
        let loader = loader(source.clone());

        for _ in 0..3 {
            let result = loader.get(LoadRequest::layer(Layer::Core)).await;
            assert!(!result.complete);
        }
        assert_eq!(
            loader.breakers().state("layer_load.core"),
            Some(CircuitState::Open)
        );
        assert_eq!(source.fetch_count(), 3);

        // Fourth call: rejected without touching the backend
        let result = loader.get(LoadRequest::layer(Layer::Core)).await;
        assert!(!result.complete);
        assert_eq!(result.degradation, DegradationLevel::MinimalFallback);
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn layers_use_independent_breakers() {
        let source = StubSource::new(Behavior::Fail);
        let loader = loader(source.clone());

        for _ in 0..3 {
            loader.get(LoadRequest::layer(Layer::Core)).await;
        }
        assert_eq!(
            loader.breakers().state("layer_load.core"),
            Some(CircuitState::Open)
        );

        source.set(Behavior::Answer("guidelines content".into()));
        let result = loader.get(LoadRequest::layer(Layer::Guidelines)).await;
        assert!(result.complete);
    }

    #[tokio::test(start_paused = true)]
    async fn request_deadline_caps_the_tier_budget() {
        let source = StubSource::new(Behavior::Hang);
        let started = Instant::now();
        let result = loader(source)
            .get(LoadRequest::layer(Layer::Core).with_deadline_ms(120))
            .await;

        // Bounded by the 120ms caller deadline, not T2's 500ms
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(!result.complete);
    }

    #[tokio::test]
    async fn batch_loads_each_layer() {
        let source = StubSource::answering("layer content");
        let results = loader(source)
            .get_batch(&[Layer::Index, Layer::Core], 5_000)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.complete));
        assert_eq!(results[0].layer, Layer::Index);
        assert_eq!(results[1].layer, Layer::Core);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_shares_one_outer_budget() {
        let source = StubSource::new(Behavior::Hang);
        let loader = loader(source);
        let started = Instant::now();
        let results = loader.get_batch(&[Layer::Index, Layer::Core], 150).await;

        // Index burns its T1 100ms; Core only gets what is left of the
        // outer 150ms, not its nominal T2 500ms
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.complete));
    }

    #[tokio::test]
    async fn try_get_propagates_failures() {
        let source = StubSource::new(Behavior::Fail);
        let result = loader(source).try_get(LoadRequest::layer(Layer::Core)).await;

        assert!(matches!(
            result,
            Err(LoadError::Source(SourceError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn lifecycle_events_for_a_healthy_load() {
        let source = StubSource::answering("content");
        let loader = loader(source);

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        loader
            .events()
            .subscribe_fn("source.*", 100, "recorder", move |event| {
                let seen = seen_clone.clone();
                async move {
                    seen.lock().unwrap().push(event.topic.clone());
                    Ok(())
                }
            })
            .unwrap();

        loader.get(LoadRequest::layer(Layer::Core)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["source.load.start", "source.load.complete"]
        );
    }

    #[tokio::test]
    async fn lifecycle_events_for_a_degraded_load() {
        let source = StubSource::new(Behavior::Fail);
        let loader = loader(source);

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        loader
            .events()
            .subscribe_fn("source.*", 100, "recorder", move |event| {
                let seen = seen_clone.clone();
                async move {
                    seen.lock().unwrap().push(event.topic.clone());
                    Ok(())
                }
            })
            .unwrap();

        loader.get(LoadRequest::layer(Layer::Core)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["source.load.start", "source.load.degraded"]
        );
    }

    #[tokio::test]
    async fn noop_cache_disables_stale_tier() {
        let source = StubSource::answering("healthy");
        let loader = loader(source.clone()).with_cache(Arc::new(crate::NoopCache));

        loader.get(LoadRequest::layer(Layer::Core)).await;
        source.set(Behavior::Fail);
        let result = loader.get(LoadRequest::layer(Layer::Core)).await;

        // Nothing was cached, so the minimal fallback serves
        assert_eq!(result.degradation, DegradationLevel::MinimalFallback);
    }
}
