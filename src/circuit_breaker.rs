//! # Circuit Breaker Module
//!
//! Stops calling the notification collaborator after repeated failures so a
//! broken delivery backend does not slow down every cook.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::NotificationConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker guarding notification delivery
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold reached, requests are skipped
/// - **Half-Open**: Reset period elapsed, the next request is let through
///
/// # Configuration
///
/// Uses `NotificationConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before attempting reset (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fridge_recipes::circuit_breaker::CircuitBreaker;
    /// use fridge_recipes::config::NotificationConfig;
    ///
    /// let breaker = CircuitBreaker::new(&NotificationConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: &NotificationConfig) -> Self {
        Self::with_limits(
            config.circuit_breaker_threshold,
            Duration::from_secs(config.circuit_breaker_reset_secs),
        )
    }

    pub fn with_limits(threshold: u32, reset_after: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold,
            reset_after,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // The state is two plain counters, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check if the circuit is open (skipping requests)
    ///
    /// Resets to closed once the reset period has elapsed since the last failure.
    pub fn is_open(&self) -> bool {
        let mut state = self.lock();

        if self.threshold == 0 || state.failure_count < self.threshold {
            return false;
        }
        match state.last_failure_time {
            Some(last) if last.elapsed() < self.reset_after => true,
            _ => {
                info!("Notification circuit breaker reset after cool-down");
                *state = BreakerState::default();
                false
            }
        }
    }

    /// Record a failed delivery
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        if self.threshold > 0 && state.failure_count == self.threshold {
            warn!(
                "Notification circuit breaker opened after {} consecutive failures",
                state.failure_count
            );
        }
    }

    /// Record a successful delivery, closing the circuit
    pub fn record_success(&self) {
        *self.lock() = BreakerState::default();
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }
}
