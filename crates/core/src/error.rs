//! Error types for the SAGE knowledge-loading domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Every variant of [`LoadError`] is recoverable through the degradation
//! policy; the loader boundary converts all of them into a `LoadResult`
//! unless the caller explicitly opted into strict propagation.

use thiserror::Error;

/// The top-level error type for all knowledge-loading operations.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A deadline elapsed before the operation finished. The signal may
    /// carry partial output the operation produced before the cutoff.
    #[error("{0}")]
    Timeout(TimeoutSignal),

    /// The circuit breaker for this operation class is open; the underlying
    /// operation was never attempted.
    #[error("Circuit open for operation class '{class}'")]
    CircuitOpen { class: String },

    // --- Content backend errors ---
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    // --- Cache store errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoadError {
    /// Short machine-readable kind, used in degraded-load event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::Timeout(_) => "timeout",
            LoadError::CircuitOpen { .. } => "circuit_open",
            LoadError::Source(_) => "source",
            LoadError::Cache(_) => "cache",
            LoadError::Config { .. } => "config",
            LoadError::Internal(_) => "internal",
        }
    }
}

/// Result type alias using our LoadError.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Deadline-exceeded signal returned by the timeout manager.
///
/// Carries whatever partial output the detached operation had streamed into
/// its [`PartialSink`](crate::source::PartialSink) before the cutoff.
#[derive(Debug, Clone, Error)]
#[error("Operation timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
pub struct TimeoutSignal {
    /// Time actually spent waiting before the signal fired.
    pub elapsed_ms: u64,

    /// The budget the operation was given.
    pub limit_ms: u64,

    /// Partial output streamed by the operation before the cutoff, if any.
    pub partial: Option<String>,
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Content not found for layer '{layer}' (topic: {topic:?})")]
    NotFound {
        layer: String,
        topic: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Malformed content: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(String),
}
