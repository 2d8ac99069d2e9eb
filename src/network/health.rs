//! Per-endpoint failure state and latency tracking.
//!
//! Every [`NetworkEndpoint`](super::NetworkEndpoint) owns one
//! [`EndpointHealth`]. Nothing here is shared between networks, so an
//! outage on one network never shows up in another's numbers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Default EWMA smoothing factor.
const DEFAULT_ALPHA: f64 = 0.2;

/// Failure counters and EWMA latency for one endpoint.
///
/// Thread-safe via atomics, no locks. The EWMA smoothing factor `alpha`
/// controls how quickly the average responds to new observations:
/// higher alpha is more responsive and noisier.
pub struct EndpointHealth {
    /// EWMA of round-trip time in microseconds, stored as f64 bits.
    ewma_micros: AtomicU64,
    alpha: f64,
    observations: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU64,
}

/// Point-in-time copy of an endpoint's health.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    /// `None` until the first round trip completes.
    pub average_latency: Option<Duration>,
}

impl EndpointHealth {
    /// Create a tracker with the given EWMA smoothing factor.
    pub fn new(alpha: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&alpha), "alpha must be in [0.0, 1.0]");
        Self {
            ewma_micros: AtomicU64::new(0_f64.to_bits()),
            alpha,
            observations: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    /// Record a successful upstream round trip.
    pub fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.observe(latency);
    }

    /// Record a failed upstream round trip. Returns the new consecutive
    /// failure count.
    pub fn record_failure(&self, latency: Duration) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.observe(latency);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Fold one latency observation into the EWMA.
    ///
    /// Two threads racing on the first observation may both initialise the
    /// average; the estimate converges after a few more samples.
    fn observe(&self, latency: Duration) {
        let micros = latency.as_micros() as f64;
        loop {
            let current_bits = self.ewma_micros.load(Ordering::Relaxed);
            let current = f64::from_bits(current_bits);
            let new = if self.observations.load(Ordering::Relaxed) == 0 {
                micros
            } else {
                self.alpha * micros + (1.0 - self.alpha) * current
            };
            if self
                .ewma_micros
                .compare_exchange_weak(
                    current_bits,
                    new.to_bits(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                self.observations.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    /// Current EWMA latency estimate, or `None` if no observations yet.
    pub fn average_latency(&self) -> Option<Duration> {
        if self.observations.load(Ordering::Relaxed) == 0 {
            return None;
        }
        let micros = f64::from_bits(self.ewma_micros.load(Ordering::Relaxed));
        Some(Duration::from_micros(micros as u64))
    }

    /// Copy out the current counters.
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            average_latency: self.average_latency(),
        }
    }
}

impl Default for EndpointHealth {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl std::fmt::Debug for EndpointHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHealth")
            .field("snapshot", &self.snapshot())
            .field("alpha", &self.alpha)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_initially() {
        let health = EndpointHealth::default();
        let snap = health.snapshot();
        assert_eq!(snap.successes, 0);
        assert_eq!(snap.failures, 0);
        assert!(snap.average_latency.is_none());
    }

    #[test]
    fn first_observation_sets_average() {
        let health = EndpointHealth::default();
        health.record_success(Duration::from_millis(100));
        assert_eq!(health.average_latency(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn ewma_converges_toward_new_values() {
        let health = EndpointHealth::new(0.5);
        health.record_success(Duration::from_millis(100));
        health.record_success(Duration::from_millis(200));
        // 0.5 * 200 + 0.5 * 100 = 150
        assert_eq!(health.average_latency(), Some(Duration::from_millis(150)));
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let health = EndpointHealth::default();
        assert_eq!(health.record_failure(Duration::from_millis(5)), 1);
        assert_eq!(health.record_failure(Duration::from_millis(5)), 2);
        health.record_success(Duration::from_millis(5));
        let snap = health.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.failures, 2);
        assert_eq!(snap.successes, 1);
    }
}
