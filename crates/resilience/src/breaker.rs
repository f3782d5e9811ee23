//! Per-operation-class circuit breaker.
//!
//! Three states: Closed (normal), Open (fail fast), HalfOpen (probing for
//! recovery). All transitions happen under a single briefly-held mutex; no
//! await point ever runs while the lock is held. Transition events are
//! published after the lock is released.

use std::future::Future;
use std::sync::{Arc, Mutex};

use sage_config::BreakerConfig;
use sage_core::error::LoadError;
use sage_core::event::{Event, topics};
use sage_events::EventBus;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; consecutive failures are counted.
    Closed,
    /// Calls are rejected immediately without touching the backend.
    Open,
    /// A limited number of probe calls are let through.
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probes_remaining: u32,
}

/// State transitions worth announcing on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Opened,
    HalfOpened,
    Closed,
}

/// A failure tracker for one operation class.
///
/// The breaker wraps timeout-managed calls and rejects them outright once
/// the class has failed `failure_threshold` times in a row, until a probe
/// succeeds after the reset timeout.
pub struct CircuitBreaker {
    class: String,
    config: BreakerConfig,
    events: Option<Arc<EventBus>>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(class: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            class: class.into(),
            config,
            events: None,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probes_remaining: 0,
            }),
        }
    }

    /// Publish circuit transitions on the given bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// The operation class this breaker guards.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Current state. Observing an Open breaker past its reset timeout does
    /// not flip it; only an admission attempt does.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_probes_remaining = 0;
    }

    /// Run an operation through the breaker.
    ///
    /// While Open (and not yet due for a probe), the operation future is
    /// never polled and the call returns `LoadError::CircuitOpen` in ~0ms.
    /// Any `Err` from the operation counts as a failure; any `Ok` as a
    /// success.
    pub async fn call<T, F>(&self, op: F) -> Result<T, LoadError>
    where
        F: Future<Output = Result<T, LoadError>>,
    {
        match self.admit() {
            Ok(transition) => self.announce(transition).await,
            Err(err) => {
                debug!(class = %self.class, "Circuit open; rejecting call");
                return Err(err);
            }
        }

        let result = op.await;
        let transition = match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        };
        self.announce(transition).await;
        result
    }

    /// Single admission point. Returns a transition to announce when the
    /// admission itself moved the breaker from Open to HalfOpen.
    fn admit(&self) -> Result<Option<Transition>, LoadError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            CircuitState::Closed => Ok(None),
            CircuitState::Open => {
                let due = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.reset_timeout());
                if !due {
                    return Err(LoadError::CircuitOpen {
                        class: self.class.clone(),
                    });
                }
                // Cooldown elapsed: this call becomes the first probe
                inner.state = CircuitState::HalfOpen;
                inner.half_open_probes_remaining = self.config.half_open_request_limit - 1;
                Ok(Some(Transition::HalfOpened))
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probes_remaining == 0 {
                    return Err(LoadError::CircuitOpen {
                        class: self.class.clone(),
                    });
                }
                inner.half_open_probes_remaining -= 1;
                Ok(None)
            }
        }
    }

    fn record_success(&self) -> Option<Transition> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.half_open_probes_remaining = 0;
                Some(Transition::Closed)
            }
            // A probe raced a concurrent probe's failure; the fresh open
            // timer stands.
            CircuitState::Open => None,
        }
    }

    fn record_failure(&self) -> Option<Transition> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    Some(Transition::Opened)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_probes_remaining = 0;
                Some(Transition::Opened)
            }
            CircuitState::Open => None,
        }
    }

    async fn announce(&self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };

        match transition {
            Transition::Opened => {
                warn!(class = %self.class, "Circuit opened")
            }
            Transition::HalfOpened => {
                info!(class = %self.class, "Circuit half-open; probing")
            }
            Transition::Closed => {
                info!(class = %self.class, "Circuit closed")
            }
        }

        let Some(events) = &self.events else {
            return;
        };
        let topic = match transition {
            Transition::Opened => topics::CIRCUIT_OPENED,
            Transition::HalfOpened => topics::CIRCUIT_HALF_OPEN,
            Transition::Closed => topics::CIRCUIT_CLOSED,
        };
        events
            .publish(Event::new(topic).with("class", json!(self.class)))
            .await;
    }
}
