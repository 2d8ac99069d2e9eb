//! Telemetry metric names and the per-call event sink.
//!
//! The [`Dispatcher`](crate::Dispatcher) emits exactly one [`CallEvent`] per
//! dispatch into a [`TelemetrySink`]. The default [`MetricsSink`] forwards
//! events to the `metrics` facade; consumers install their own recorder
//! (e.g. prometheus, statsd). Without a recorder installed, all metric calls
//! are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `chainrelay_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `network`: network identifier as supplied by the caller
//! - `method`: upstream RPC method name
//! - `status`: outcome: "ok" or "error"
//! - `served_from`: "cache" or "upstream" ("none" for failures)
//! - `kind`: error kind (see [`ErrorKind::as_str()`])

use std::time::Duration;

use crate::cache::CacheStats;
use crate::dispatch::ServedFrom;
use crate::error::ErrorKind;

/// Total dispatched calls.
///
/// Labels: `network`, `method`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "chainrelay_requests_total";

/// Dispatch duration in seconds.
///
/// Labels: `network`, `method`, `served_from`.
pub const REQUEST_DURATION_SECONDS: &str = "chainrelay_request_duration_seconds";

/// Total failed calls.
///
/// Labels: `network`, `kind`.
pub const ERRORS_TOTAL: &str = "chainrelay_errors_total";

/// Total cache hits.
///
/// Labels: `network`, `method`.
pub const CACHE_HITS_TOTAL: &str = "chainrelay_cache_hits_total";

/// Total cache misses. Calls that bypass the cache are not counted.
///
/// Labels: `network`, `method`.
pub const CACHE_MISSES_TOTAL: &str = "chainrelay_cache_misses_total";

/// Number of live cache entries.
pub const CACHE_ENTRIES: &str = "chainrelay_cache_entries";

/// Summed cost of live cache entries (equals entry count under uniform cost).
pub const CACHE_WEIGHTED_SIZE: &str = "chainrelay_cache_weighted_size";

/// How a call interacted with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a fresh cache entry.
    Hit,
    /// Looked up, nothing fresh found.
    Miss,
    /// Cache never consulted (zero TTL, or failure before lookup).
    Bypass,
}

/// Terminal state of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Success,
    Failure(ErrorKind),
}

/// One telemetry record per dispatch.
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub network: String,
    pub method: String,
    pub cache: CacheStatus,
    /// `None` on failure.
    pub served_from: Option<ServedFrom>,
    pub outcome: EventOutcome,
    pub latency: Duration,
    /// Set when the failure was an upstream timeout or a cancelled call.
    pub timed_out: bool,
}

/// Receiver of per-call events and aggregate cache gauges.
///
/// Implementations must not block: they are invoked inline on every
/// dispatch path.
pub trait TelemetrySink: Send + Sync {
    /// Record one finished (or abandoned) call.
    fn record(&self, event: &CallEvent);

    /// Publish current cache gauges.
    fn record_cache_stats(&self, _stats: &CacheStats) {}
}

/// Sink that forwards to the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSink;

impl TelemetrySink for MetricsSink {
    fn record(&self, event: &CallEvent) {
        let status = match event.outcome {
            EventOutcome::Success => "ok",
            EventOutcome::Failure(_) => "error",
        };
        metrics::counter!(REQUESTS_TOTAL,
            "network" => event.network.clone(),
            "method" => event.method.clone(),
            "status" => status,
        )
        .increment(1);

        let served_from = event.served_from.map(ServedFrom::as_str).unwrap_or("none");
        metrics::histogram!(REQUEST_DURATION_SECONDS,
            "network" => event.network.clone(),
            "method" => event.method.clone(),
            "served_from" => served_from,
        )
        .record(event.latency.as_secs_f64());

        match event.cache {
            CacheStatus::Hit => metrics::counter!(CACHE_HITS_TOTAL,
                "network" => event.network.clone(),
                "method" => event.method.clone(),
            )
            .increment(1),
            CacheStatus::Miss => metrics::counter!(CACHE_MISSES_TOTAL,
                "network" => event.network.clone(),
                "method" => event.method.clone(),
            )
            .increment(1),
            CacheStatus::Bypass => {}
        }

        if let EventOutcome::Failure(kind) = event.outcome {
            metrics::counter!(ERRORS_TOTAL,
                "network" => event.network.clone(),
                "kind" => kind.as_str(),
            )
            .increment(1);
        }
    }

    fn record_cache_stats(&self, stats: &CacheStats) {
        metrics::gauge!(CACHE_ENTRIES).set(stats.entries as f64);
        metrics::gauge!(CACHE_WEIGHTED_SIZE).set(stats.current_size as f64);
    }
}
