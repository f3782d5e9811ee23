//! Knowledge source trait — the abstraction over content backends.
//!
//! A `KnowledgeSource` knows how to produce the content for a layer/topic
//! pair. The core does not care whether that means reading files, querying a
//! database, or calling a remote service; it only requires that the fetch be
//! cancellable by detachment and, optionally, able to stream partial output
//! into the [`PartialSink`] it is handed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::error::SourceError;
use crate::model::Layer;

/// Content produced by a knowledge source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    /// The content body.
    pub body: String,

    /// Where the content came from (a path, a URL), for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Content {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// A cloneable accumulator a fetch operation may stream partial output into.
///
/// The timeout manager snapshots the sink when a deadline fires, so a slow
/// operation's work-so-far survives as a `Partial` degradation instead of
/// being discarded. Writes after the snapshot go nowhere useful; the
/// detached operation keeps running but its result is ignored.
#[derive(Debug, Clone, Default)]
pub struct PartialSink {
    buf: Arc<Mutex<Option<String>>>,
}

impl PartialSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of streamed output.
    pub fn push(&self, chunk: &str) {
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        buf.get_or_insert_with(String::new).push_str(chunk);
    }

    /// Snapshot the accumulated output, if any was produced.
    pub fn snapshot(&self) -> Option<String> {
        self.buf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .filter(|s| !s.is_empty())
    }
}

/// The content fetch backend, consumed as a black box.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// A human-readable name for this source (e.g. "kb_files", "kb_http").
    fn name(&self) -> &str;

    /// Fetch the content for a layer/topic pair.
    ///
    /// Implementations that stream should push chunks into `partial` as they
    /// arrive; the loader recovers that output if the fetch is cut off.
    async fn fetch(
        &self,
        layer: Layer,
        topic: Option<&str>,
        partial: &PartialSink,
    ) -> Result<Content, SourceError>;
}
