//! Tiered timeout enforcement with detached cancellation.
//!
//! The manager races an operation against its budget. If the deadline fires
//! first it stops waiting and returns a `TimeoutSignal`; the operation task
//! keeps running in the background and its eventual result is discarded.
//! Cooperative cancellation is a caller concern, not guaranteed here.

use std::future::Future;
use std::time::Duration;

use sage_config::TimeoutConfig;
use sage_core::error::{LoadError, TimeoutSignal};
use sage_core::model::TimeoutTier;
use sage_core::source::PartialSink;
use tokio::time::Instant;
use tracing::warn;

/// A deadline for one operation, derived from a tier or an outer budget.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    deadline: Instant,
    limit: Duration,
}

impl Budget {
    /// A budget starting now with the given limit.
    pub fn from_duration(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
            limit,
        }
    }

    /// A budget starting now with the given limit in milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self::from_duration(Duration::from_millis(ms))
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The limit this budget was created with.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Budget left on the clock right now.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Duration::ZERO
    }
}

/// Executes operations under tiered deadlines.
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    timeouts: TimeoutConfig,
}

impl TimeoutManager {
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self { timeouts }
    }

    /// A fresh budget for a tier's full configured duration.
    pub fn budget(&self, tier: TimeoutTier) -> Budget {
        Budget::from_duration(self.timeouts.duration(tier))
    }

    /// A budget for an inner call issued while an outer budget is running.
    ///
    /// The inner call gets `min(tier duration, outer remaining)`: an inner
    /// T2 call invoked with only 120ms of outer budget left is bounded by
    /// 120ms, not 500ms. Sequential inner calls each see the then-current
    /// remaining budget.
    pub fn nested(&self, outer: &Budget, tier: TimeoutTier) -> Budget {
        let limit = self.timeouts.duration(tier).min(outer.remaining());
        Budget::from_duration(limit)
    }

    /// Run an operation under a budget.
    ///
    /// The operation is spawned so the race can abandon it: on deadline the
    /// handle is dropped, the task keeps running detached, and whatever it
    /// streamed into `partial` so far is carried on the returned signal. An
    /// operation that finishes in time has its own result (success or error)
    /// returned unmodified. A panicking operation surfaces as
    /// `LoadError::Internal`.
    pub async fn run<T, F>(
        &self,
        budget: Budget,
        partial: PartialSink,
        op: F,
    ) -> Result<T, LoadError>
    where
        F: Future<Output = Result<T, LoadError>> + Send + 'static,
        T: Send + 'static,
    {
        let started = Instant::now();
        let mut task = tokio::spawn(op);

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(join_err) => Err(LoadError::Internal(format!(
                    "operation task failed: {join_err}"
                ))),
            },
            _ = tokio::time::sleep_until(budget.deadline()) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let limit_ms = budget.limit().as_millis() as u64;
                let captured = partial.snapshot();
                warn!(
                    elapsed_ms,
                    limit_ms,
                    partial = captured.is_some(),
                    "Operation deadline elapsed; detaching"
                );
                Err(LoadError::Timeout(TimeoutSignal {
                    elapsed_ms,
                    limit_ms,
                    partial: captured,
                }))
            }
        }
    }
}
