//! Breaker registry — one lazily-created breaker per operation class.
//!
//! The registry is the only long-lived shared mutable resource in the
//! loading core. Breakers persist for the process lifetime (or until
//! explicitly reset).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sage_config::BreakerConfig;
use sage_events::EventBus;
use tracing::debug;

use crate::breaker::{CircuitBreaker, CircuitState};

/// Central registry holding one circuit breaker per operation class.
pub struct BreakerRegistry {
    config: BreakerConfig,
    events: Option<Arc<EventBus>>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create an empty registry.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            events: None,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Publish circuit transitions of all managed breakers on the given bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Get the breaker for an operation class, creating it on first use.
    pub fn get_or_create(&self, class: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(|e| e.into_inner());
            if let Some(breaker) = breakers.get(class) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        // Re-check: another caller may have created it between the locks
        if let Some(breaker) = breakers.get(class) {
            return breaker.clone();
        }

        debug!(class = %class, "Creating circuit breaker");
        let mut breaker = CircuitBreaker::new(class, self.config.clone());
        if let Some(events) = &self.events {
            breaker = breaker.with_events(events.clone());
        }
        let breaker = Arc::new(breaker);
        breakers.insert(class.to_string(), breaker.clone());
        breaker
    }

    /// Current state of a class's breaker, if one exists yet.
    pub fn state(&self, class: &str) -> Option<CircuitState> {
        self.breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(class)
            .map(|b| b.state())
    }

    /// Reset a class's breaker to Closed. Returns whether it existed.
    pub fn reset(&self, class: &str) -> bool {
        let breakers = self.breakers.read().unwrap_or_else(|e| e.into_inner());
        match breakers.get(class) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// All operation classes seen so far.
    pub fn classes(&self) -> Vec<String> {
        self.breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
