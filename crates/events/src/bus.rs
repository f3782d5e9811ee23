//! The event bus — priority-ordered dispatch with per-handler isolation.
//!
//! `publish` is fire-and-forget from the publisher's perspective: it cannot
//! fail and it never surfaces a handler's problems. Internally it awaits
//! every matching handler in priority order, each wrapped in its own
//! timeout and error boundary.

use std::sync::Arc;
use std::time::Duration;

use sage_core::event::{Event, EventHandler, FnHandler};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::pattern::{PatternError, TopicPattern};

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    priority: i32,
    seq: u64,
    handler: Arc<dyn EventHandler>,
}

struct BusInner {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

/// An asynchronous publish/subscribe bus with wildcard topic matching,
/// priority-ordered handler execution, and per-handler timeout/error
/// isolation.
pub struct EventBus {
    handler_timeout: Duration,
    inner: std::sync::RwLock<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default per-handler timeout (T2, 500ms).
    pub fn new() -> Self {
        Self {
            handler_timeout: Duration::from_millis(500),
            inner: std::sync::RwLock::new(BusInner {
                subscriptions: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Set the per-handler timeout.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Register a handler for topics matching `pattern`. Lower priority
    /// numbers run earlier; ties run in registration order.
    pub fn subscribe(
        &self,
        pattern: &str,
        priority: i32,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, PatternError> {
        let pattern = TopicPattern::parse(pattern)?;
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let id = SubscriptionId(inner.next_id);
        let seq = inner.next_id;
        inner.next_id += 1;
        inner.subscriptions.push(Subscription {
            id,
            pattern,
            priority,
            seq,
            handler,
        });
        Ok(id)
    }

    /// Register an async closure as a handler.
    pub fn subscribe_fn<F, Fut>(
        &self,
        pattern: &str,
        priority: i32,
        name: &str,
        f: F,
    ) -> Result<SubscriptionId, PatternError>
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe(pattern, priority, Arc::new(FnHandler::new(name, f)))
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        inner.subscriptions.len() < before
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .subscriptions
            .len()
    }

    /// Publish an event to all matching subscribers.
    ///
    /// Handlers run one at a time in ascending `(priority, registration)`
    /// order. A handler that fails, times out, or panics is logged and
    /// skipped; dispatch to the remaining handlers continues and `publish`
    /// always returns normally. Ordering is only guaranteed within a single
    /// `publish` call, not between concurrent publishes.
    pub async fn publish(&self, event: Event) {
        let event = Arc::new(event);

        let mut matched: Vec<(i32, u64, Arc<dyn EventHandler>)> = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            inner
                .subscriptions
                .iter()
                .filter(|s| s.pattern.matches(&event.topic))
                .map(|s| (s.priority, s.seq, s.handler.clone()))
                .collect()
        };

        if matched.is_empty() {
            return;
        }
        matched.sort_by_key(|(priority, seq, _)| (*priority, *seq));

        debug!(topic = %event.topic, handlers = matched.len(), "Dispatching event");

        for (_, _, handler) in matched {
            let name = handler.name().to_string();
            let handler_event = event.clone();

            // Spawned so a panicking handler surfaces as a JoinError instead
            // of unwinding through the publisher.
            let task = tokio::spawn(async move { handler.handle(handler_event).await });

            match timeout(self.handler_timeout, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!(handler = %name, topic = %event.topic, error = %e, "Event handler failed");
                }
                Ok(Err(join_err)) => {
                    warn!(handler = %name, topic = %event.topic, error = %join_err, "Event handler panicked");
                }
                Err(_) => {
                    warn!(
                        handler = %name,
                        topic = %event.topic,
                        timeout_ms = self.handler_timeout.as_millis() as u64,
                        "Event handler timed out; detaching"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_core::event::topics;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Arc<FnHandler>) {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |label: &str| {
            let log = log_clone.clone();
            let label = label.to_string();
            Arc::new(FnHandler::new(label.clone(), move |_event| {
                let log = log.clone();
                let label = label.clone();
                async move {
                    log.lock().unwrap().push(label);
                    Ok(())
                }
            }))
        };
        (log, make)
    }

    #[tokio::test]
    async fn priority_order_beats_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        // Registered out of priority order on purpose
        bus.subscribe(topics::LOAD_COMPLETE, 90, make("p90")).unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, 10, make("p10")).unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, 50, make("p50")).unwrap();

        bus.publish(Event::new(topics::LOAD_COMPLETE)).await;

        assert_eq!(*log.lock().unwrap(), vec!["p10", "p50", "p90"]);
    }

    #[tokio::test]
    async fn priority_bands_run_in_band_order() {
        use sage_core::event::priority;

        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe(topics::LOAD_COMPLETE, priority::CLEANUP, make("cleanup"))
            .unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, priority::LOW, make("metrics"))
            .unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, priority::SYSTEM, make("system"))
            .unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, priority::NORMAL, make("app"))
            .unwrap();

        bus.publish(Event::new(topics::LOAD_COMPLETE)).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["system", "app", "metrics", "cleanup"]
        );
    }

    #[tokio::test]
    async fn equal_priority_runs_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe("source.*", 100, make("first")).unwrap();
        bus.subscribe("source.*", 100, make("second")).unwrap();
        bus.subscribe("source.*", 100, make("third")).unwrap();

        bus.publish(Event::new(topics::LOAD_START)).await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe_fn(topics::LOAD_COMPLETE, 10, "failing", |_event| async {
            anyhow::bail!("handler exploded")
        })
        .unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, 50, make("p50")).unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, 90, make("p90")).unwrap();

        // Must not panic or propagate the handler error
        bus.publish(Event::new(topics::LOAD_COMPLETE)).await;

        assert_eq!(*log.lock().unwrap(), vec!["p50", "p90"]);
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe_fn(topics::LOAD_COMPLETE, 10, "panicking", |_event| async {
            panic!("handler panic")
        })
        .unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, 50, make("survivor")).unwrap();

        bus.publish(Event::new(topics::LOAD_COMPLETE)).await;

        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out_and_dispatch_continues() {
        let bus = EventBus::new().with_handler_timeout(Duration::from_millis(500));
        let (log, make) = recorder();

        bus.subscribe_fn(topics::LOAD_COMPLETE, 10, "sleeper", |_event| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .unwrap();
        bus.subscribe(topics::LOAD_COMPLETE, 50, make("after")).unwrap();

        bus.publish(Event::new(topics::LOAD_COMPLETE)).await;

        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[tokio::test]
    async fn only_matching_subscriptions_run() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        bus.subscribe_fn("circuit.*", 100, "circuit_watcher", move |_event| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        bus.publish(Event::new(topics::LOAD_START)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.publish(Event::new(topics::CIRCUIT_OPENED)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_handler() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        let id = bus.subscribe(topics::LOAD_START, 100, make("gone")).unwrap();
        assert_eq!(bus.subscription_count(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscription_count(), 0);

        bus.publish(Event::new(topics::LOAD_START)).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(Event::new(topics::LOAD_START)).await;
    }
}
