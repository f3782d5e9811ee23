//! # SAGE Events
//!
//! The in-process asynchronous event bus for the knowledge-loading core.
//! Subscriptions match dot-namespaced topics (with a trailing wildcard
//! segment), dispatch in ascending priority order, and each handler runs
//! inside its own timeout and error boundary so plugin-style extensions can
//! never take the pipeline down.

mod bus;
mod pattern;

pub use bus::{EventBus, SubscriptionId};
pub use pattern::{PatternError, TopicPattern};
