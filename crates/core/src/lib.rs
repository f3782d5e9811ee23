//! # SAGE Core
//!
//! Domain types, traits, and error definitions for the SAGE knowledge-loading
//! runtime. This crate never touches the async runtime itself — it holds the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each external collaborator (content backend, cache store, event handler)
//! is a trait defined here; implementations live in the satellite crates.
//! That keeps the dependency graph pointing inward, lets deployments swap
//! backends through configuration, and makes stubbing in tests trivial.

pub mod cache;
pub mod error;
pub mod event;
pub mod model;
pub mod source;

// Re-export key types at crate root for ergonomics
pub use cache::{CacheStore, CachedContent};
pub use error::{CacheError, LoadError, Result, SourceError, TimeoutSignal};
pub use event::{Event, EventHandler, FnHandler};
pub use model::{DegradationLevel, Layer, LoadRequest, LoadResult, TimeoutTier};
pub use source::{Content, KnowledgeSource, PartialSink};
