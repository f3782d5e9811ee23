//! Lifecycle event model — decoupled communication between components.
//!
//! Events are published when something interesting happens in the loading
//! pipeline. Other components subscribe to react without tight coupling.
//! Topics are dot-namespaced strings; the payload is an opaque JSON map.
//! An event is immutable once published.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Well-known observability topics. Subscribers are read-only consumers;
/// none of these carry control authority back into the core.
pub mod topics {
    /// A load request entered the pipeline.
    pub const LOAD_START: &str = "source.load.start";
    /// A load request was answered by the backend in time.
    pub const LOAD_COMPLETE: &str = "source.load.complete";
    /// A load request fell back to a degraded answer.
    pub const LOAD_DEGRADED: &str = "source.load.degraded";
    /// A circuit breaker opened for an operation class.
    pub const CIRCUIT_OPENED: &str = "circuit.opened";
    /// A circuit breaker began probing for recovery.
    pub const CIRCUIT_HALF_OPEN: &str = "circuit.half_open";
    /// A circuit breaker closed after a successful probe.
    pub const CIRCUIT_CLOSED: &str = "circuit.closed";
}

/// Conventional priority bands for subscriptions. Lower runs earlier;
/// anything in between is fine when a handler needs to slot among others.
pub mod priority {
    /// Handlers that must observe events before anything else reacts.
    pub const SYSTEM: i32 = 0;
    /// The default band for application handlers.
    pub const NORMAL: i32 = 100;
    /// Logging and metrics consumers.
    pub const LOW: i32 = 500;
    /// Handlers that run after everyone else.
    pub const CLEANUP: i32 = 1000;
}

/// A lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for log correlation.
    pub id: Uuid,

    /// Dot-namespaced topic (e.g. "source.load.complete").
    pub topic: String,

    /// Opaque payload map.
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a payload field.
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// A subscriber on the event bus.
///
/// Handlers run inside their own timeout and error boundary; a failing or
/// slow handler is logged and skipped, never propagated to the publisher.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// A human-readable name for log attribution.
    fn name(&self) -> &str {
        "handler"
    }

    /// Handle an event. Errors are caught by the bus.
    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler {
    name: String,
    f: Box<dyn Fn(Arc<Event>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>,
}

impl FnHandler {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(move |event| Box::pin(f(event))),
        }
    }
}

#[async_trait::async_trait]
impl EventHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        (self.f)(event).await
    }
}
