//! # SAGE Loader
//!
//! Orchestrates the resilient knowledge-loading pipeline: every request runs
//! through a circuit breaker and a tiered timeout, lifecycle events are
//! published along the way, and any failure is converted into the best
//! available degraded answer. `KnowledgeLoader::get` always returns a
//! `LoadResult` within the request's budget plus a small fixed overhead —
//! it never hangs and never fails.

mod degrade;
mod in_memory;
mod loader;
mod noop;

pub use degrade::DegradationPolicy;
pub use in_memory::MemoryCache;
pub use loader::KnowledgeLoader;
pub use noop::NoopCache;
