//! Domain model for knowledge-loading requests and results.
//!
//! These types define the request/response structures for the loading
//! pipeline: timeout tiers, knowledge layers, degradation levels, and the
//! `LoadRequest`/`LoadResult` pair that is the loader's sole public surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Minimal fallback payload bundled with the system.
///
/// Returned as a last resort when the backend, the cache, and any partial
/// output are all unavailable. Deployments can override it through the
/// degradation configuration.
pub const MINIMAL_FALLBACK: &str = "\
# Knowledge temporarily unavailable

The knowledge base could not be reached within the allotted time.
Proceed with general best practices and retry shortly.
";

/// A fixed timeout duration class, from cache-level lookups (T1) to complex
/// analysis (T5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutTier {
    T1,
    T2,
    T3,
    T4,
    T5,
}

impl TimeoutTier {
    /// The built-in duration for this tier. Deployments may override these
    /// through `TimeoutConfig`.
    pub fn nominal(&self) -> Duration {
        match self {
            TimeoutTier::T1 => Duration::from_millis(100),
            TimeoutTier::T2 => Duration::from_millis(500),
            TimeoutTier::T3 => Duration::from_secs(2),
            TimeoutTier::T4 => Duration::from_secs(5),
            TimeoutTier::T5 => Duration::from_secs(10),
        }
    }
}

impl fmt::Display for TimeoutTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeoutTier::T1 => "t1",
            TimeoutTier::T2 => "t2",
            TimeoutTier::T3 => "t3",
            TimeoutTier::T4 => "t4",
            TimeoutTier::T5 => "t5",
        };
        write!(f, "{name}")
    }
}

/// The five knowledge layers of the SAGE knowledge base, ordered from the
/// navigation index (L0) up to working practices (L4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Index,
    Core,
    Guidelines,
    Frameworks,
    Practices,
}

impl Layer {
    /// All layers in loading order.
    pub const ALL: [Layer; 5] = [
        Layer::Index,
        Layer::Core,
        Layer::Guidelines,
        Layer::Frameworks,
        Layer::Practices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Index => "index",
            Layer::Core => "core",
            Layer::Guidelines => "guidelines",
            Layer::Frameworks => "frameworks",
            Layer::Practices => "practices",
        }
    }

    /// Parse a layer name. Accepts the snake_case form used in requests.
    pub fn parse(s: &str) -> Option<Layer> {
        match s {
            "index" => Some(Layer::Index),
            "core" => Some(Layer::Core),
            "guidelines" => Some(Layer::Guidelines),
            "frameworks" => Some(Layer::Frameworks),
            "practices" => Some(Layer::Practices),
            _ => None,
        }
    }

    /// The default timeout tier for loading this layer. The index is a
    /// cache-level lookup; core guidance is small; the deeper layers carry
    /// larger documents.
    pub fn default_tier(&self) -> TimeoutTier {
        match self {
            Layer::Index => TimeoutTier::T1,
            Layer::Core => TimeoutTier::T2,
            Layer::Guidelines => TimeoutTier::T3,
            Layer::Frameworks => TimeoutTier::T3,
            Layer::Practices => TimeoutTier::T3,
        }
    }

    /// The circuit-breaker operation class for this layer. One class per
    /// layer keeps an unhealthy layer from failing loads of the others.
    pub fn operation_class(&self) -> String {
        format!("layer_load.{}", self.as_str())
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much quality was given up to produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// The backend answered in time.
    Full,
    /// Partial output captured from a timed-out operation.
    Partial,
    /// A previously cached answer within the staleness bound.
    StaleCache,
    /// The bundled minimal fallback payload.
    MinimalFallback,
}

/// A knowledge load request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Which knowledge layer to load.
    pub layer: Layer,

    /// Optional topic within the layer (e.g. "rust", "error_handling").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Caller-supplied deadline. When set, the effective budget is the
    /// smaller of this and the layer's tier duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl LoadRequest {
    /// Request a whole layer.
    pub fn layer(layer: Layer) -> Self {
        Self {
            layer,
            topic: None,
            deadline_ms: None,
        }
    }

    /// Narrow the request to a topic within the layer.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Bound the request by a caller deadline in milliseconds.
    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    /// Stable cache key for this request.
    pub fn cache_key(&self) -> String {
        match &self.topic {
            Some(topic) => format!("{}/{}", self.layer, topic),
            None => self.layer.to_string(),
        }
    }
}

/// A knowledge load result. The loader always returns one of these; the
/// worst case is an empty minimal fallback, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    /// The content that was loaded (possibly partial, stale, or fallback).
    pub content: String,

    /// The layer this result answers for.
    pub layer: Layer,

    /// Whether the backend answered fully. `false` implies a degradation
    /// level other than `Full`.
    pub complete: bool,

    /// Which fallback tier produced the content.
    pub degradation: DegradationLevel,

    /// Wall time spent serving the request.
    pub elapsed_ms: u64,

    /// Rough token estimate for the content (len / 4 heuristic).
    pub tokens: u32,

    /// Failure descriptions accumulated on the degraded path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl LoadResult {
    /// A successful, non-degraded result.
    pub fn full(content: impl Into<String>, layer: Layer, elapsed_ms: u64) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self {
            content,
            layer,
            complete: true,
            degradation: DegradationLevel::Full,
            elapsed_ms,
            tokens,
            errors: Vec::new(),
        }
    }

    /// A degraded result. `complete` is always `false` on this path.
    pub fn degraded(
        content: impl Into<String>,
        layer: Layer,
        degradation: DegradationLevel,
        elapsed_ms: u64,
    ) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self {
            content,
            layer,
            complete: false,
            degradation,
            elapsed_ms,
            tokens,
            errors: Vec::new(),
        }
    }

    /// Attach a failure description.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }
}

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(content: &str) -> u32 {
    (content.len() / 4) as u32
}
