//! Topic pattern matching for subscriptions.
//!
//! Patterns are dot-namespaced topic names, optionally ending in a `*`
//! segment that matches one or more remaining segments. Patterns are parsed
//! once at subscribe time and matched cheaply on every publish.

use thiserror::Error;

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    /// Literal leading segments.
    segments: Vec<String>,

    /// Whether the pattern ended in a trailing `*` segment.
    wildcard: bool,
}

/// Pattern parse errors.
#[derive(Debug, Clone, Error)]
pub enum PatternError {
    #[error("Pattern must not be empty")]
    Empty,

    #[error("Pattern '{0}' has an empty segment")]
    EmptySegment(String),

    #[error("Pattern '{0}' uses '*' outside the trailing position")]
    NonTrailingWildcard(String),
}

impl TopicPattern {
    /// Parse a pattern like `"source.load.complete"` or `"source.*"`.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }

        let raw: Vec<&str> = pattern.split('.').collect();
        if raw.iter().any(|s| s.is_empty()) {
            return Err(PatternError::EmptySegment(pattern.to_string()));
        }

        let wildcard = raw.last().copied() == Some("*");
        let literal = if wildcard { &raw[..raw.len() - 1] } else { &raw[..] };
        if literal.iter().any(|s| *s == "*") {
            return Err(PatternError::NonTrailingWildcard(pattern.to_string()));
        }

        Ok(Self {
            segments: literal.iter().map(|s| s.to_string()).collect(),
            wildcard,
        })
    }

    /// Whether a published topic matches this pattern.
    ///
    /// A trailing wildcard matches one or more remaining segments, so
    /// `"source.*"` matches `"source.load.complete"` but neither
    /// `"sourceX.y"` nor bare `"source"`.
    pub fn matches(&self, topic: &str) -> bool {
        let topic_segments: Vec<&str> = topic.split('.').collect();

        if self.wildcard {
            topic_segments.len() > self.segments.len()
                && self
                    .segments
                    .iter()
                    .zip(&topic_segments)
                    .all(|(pat, seg)| pat == seg)
        } else {
            topic_segments.len() == self.segments.len()
                && self
                    .segments
                    .iter()
                    .zip(&topic_segments)
                    .all(|(pat, seg)| pat == seg)
        }
    }
}
