//! Request dispatch: cache consultation, upstream routing, telemetry.
//!
//! # Call flow
//!
//! ```text
//! handle(method, network, params)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ request shape    │ ── bad ──► Failure(Client | Validation)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ resolve network  │ ── unknown ──► Failure(Client)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ TTL for method   │ ── zero ──► skip cache entirely ──┐
//! └────────┬─────────┘                                   │
//!          ▼                                             │
//! ┌──────────────────┐                                   │
//! │ cache lookup     │ ── hit ──► Success(Cache)         │
//! └────────┬─────────┘                                   │
//!          │ miss                                        │
//!          ▼                                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │ upstream call (one attempt, endpoint timeout)            │
//! └────────┬─────────────────────────────────────────┬───────┘
//!          │ ok                                      │ err
//!          ▼                                         ▼
//!   populate cache (if TTL > 0)              Failure(kind), no cache write
//!   Success(Upstream)
//! ```
//!
//! Every exit emits exactly one [`CallEvent`]. A dispatch future dropped
//! before completion (client cancellation, outer timeout) still emits one,
//! classified as a `Network` timeout, and never leaves a partial cache
//! entry: the cache is only written after a complete upstream response.
//!
//! # Concurrent misses
//!
//! Concurrent misses for the same key are not coalesced. Each performs its
//! own upstream call and populates the cache; the last population to finish
//! wins. Blockchain reads are idempotent, so the only cost is duplicate
//! upstream load during a burst.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::cache::{CacheBackend, CacheConfig, CacheKey, CacheStats, ResponseCache};
use crate::error::ErrorKind;
use crate::network::NetworkRegistry;
use crate::telemetry::{CacheStatus, CallEvent, EventOutcome, MetricsSink, TelemetrySink};
use crate::upstream::{self, HttpInvoker, UpstreamInvoker};
use crate::{RelayError, Result};

/// Where a successful payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Cache,
    Upstream,
}

impl ServedFrom {
    /// Lowercase label used for metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ServedFrom::Cache => "cache",
            ServedFrom::Upstream => "upstream",
        }
    }
}

/// Result of one dispatch.
#[derive(Debug)]
pub enum Outcome {
    Success {
        payload: Arc<Value>,
        served_from: ServedFrom,
        latency: Duration,
    },
    Failure {
        error: RelayError,
        latency: Duration,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Source of the payload; `None` on failure.
    pub fn served_from(&self) -> Option<ServedFrom> {
        match self {
            Outcome::Success { served_from, .. } => Some(*served_from),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn latency(&self) -> Duration {
        match self {
            Outcome::Success { latency, .. } | Outcome::Failure { latency, .. } => *latency,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Outcome::Success { payload, .. } => Some(payload),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&RelayError> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { error, .. } => Some(error),
        }
    }

    /// Error kind; `None` on success.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error().map(RelayError::kind)
    }

    /// Convert into the payload or the error.
    pub fn into_result(self) -> Result<Arc<Value>> {
        match self {
            Outcome::Success { payload, .. } => Ok(payload),
            Outcome::Failure { error, .. } => Err(error),
        }
    }
}

/// Emits the call's telemetry event exactly once, including when the
/// dispatch future is dropped mid-flight.
struct CallGuard<'a> {
    sink: &'a dyn TelemetrySink,
    network: &'a str,
    method: &'a str,
    start: Instant,
    cache: CacheStatus,
    finished: bool,
}

impl<'a> CallGuard<'a> {
    fn new(sink: &'a dyn TelemetrySink, network: &'a str, method: &'a str) -> Self {
        Self {
            sink,
            network,
            method,
            start: Instant::now(),
            cache: CacheStatus::Bypass,
            finished: false,
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn emit(&self, outcome: EventOutcome, served_from: Option<ServedFrom>, timed_out: bool) {
        self.sink.record(&CallEvent {
            network: self.network.to_string(),
            method: self.method.to_string(),
            cache: self.cache,
            served_from,
            outcome,
            latency: self.elapsed(),
            timed_out,
        });
    }

    fn finish(mut self, outcome: &Outcome) {
        self.finished = true;
        match outcome {
            Outcome::Success { served_from, .. } => {
                self.emit(EventOutcome::Success, Some(*served_from), false)
            }
            Outcome::Failure { error, .. } => {
                self.emit(EventOutcome::Failure(error.kind()), None, error.is_timeout())
            }
        }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                network = self.network,
                method = self.method,
                "dispatch abandoned before completion"
            );
            self.emit(EventOutcome::Failure(ErrorKind::Network), None, true);
        }
    }
}

/// Orchestrates cache, registry, invoker and telemetry. See module docs.
///
/// All collaborators are injected; nothing is process-global. Build one
/// with [`Dispatcher::builder()`].
pub struct Dispatcher {
    registry: Arc<NetworkRegistry>,
    cache: Arc<dyn CacheBackend>,
    invoker: Arc<dyn UpstreamInvoker>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Dispatcher {
    /// Create a new builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The network registry (for reloads and health queries).
    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// Dispatch one call. Never panics and never returns early without a
    /// telemetry event.
    #[instrument(skip_all, fields(network = %network, method = %method))]
    pub async fn handle(&self, method: &str, network: &str, params: &Value) -> Outcome {
        let mut guard = CallGuard::new(self.telemetry.as_ref(), network, method);
        let outcome = match self.run(method, network, params, &mut guard).await {
            Ok((payload, served_from)) => Outcome::Success {
                payload,
                served_from,
                latency: guard.elapsed(),
            },
            Err(error) => Outcome::Failure {
                error,
                latency: guard.elapsed(),
            },
        };
        guard.finish(&outcome);
        outcome
    }

    async fn run(
        &self,
        method: &str,
        network: &str,
        params: &Value,
        guard: &mut CallGuard<'_>,
    ) -> Result<(Arc<Value>, ServedFrom)> {
        validate_request(method, params)?;
        let endpoint = self.registry.resolve(network)?;

        let ttl = self.registry.ttl_for_endpoint(&endpoint, method);
        let mut cache_slot = None;
        if !ttl.is_zero() {
            let key = CacheKey::new(network, method, params);
            match self.cache.lookup(&key) {
                Ok(Some(payload)) => {
                    guard.cache = CacheStatus::Hit;
                    debug!("cache hit");
                    return Ok((payload, ServedFrom::Cache));
                }
                Ok(None) => {
                    guard.cache = CacheStatus::Miss;
                    debug!("cache miss");
                    cache_slot = Some(key);
                }
                Err(e) => {
                    // Degrade to an uncached call rather than failing it.
                    guard.cache = CacheStatus::Miss;
                    error!(kind = %e.kind(), error = %e, "cache unusable for this call");
                }
            }
        }

        let started = Instant::now();
        let result =
            upstream::call_with_timeout(self.invoker.as_ref(), &endpoint, method, params).await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                endpoint.health().record_success(elapsed);
                let payload = Arc::new(value);
                if let Some(key) = cache_slot {
                    self.cache.put(key, Arc::clone(&payload), ttl);
                    self.telemetry.record_cache_stats(&self.cache.stats());
                }
                Ok((payload, ServedFrom::Upstream))
            }
            Err(e) => {
                if e.kind() == ErrorKind::Network {
                    let consecutive = endpoint.health().record_failure(elapsed);
                    warn!(
                        kind = %e.kind(),
                        error = %e,
                        consecutive_failures = consecutive,
                        "upstream call failed"
                    );
                } else {
                    endpoint.health().record_success(elapsed);
                    warn!(kind = %e.kind(), error = %e, "upstream returned an error");
                }
                Err(e)
            }
        }
    }

    /// Drop the cached response for one call, if any.
    pub fn invalidate(&self, method: &str, network: &str, params: &Value) {
        self.cache.invalidate(&CacheKey::new(network, method, params));
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.telemetry.record_cache_stats(&self.cache.stats());
    }

    /// Current cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Reject requests that cannot be forwarded as JSON-RPC.
fn validate_request(method: &str, params: &Value) -> Result<()> {
    if method.trim().is_empty() {
        return Err(RelayError::InvalidRequest(
            "method name must not be empty".to_string(),
        ));
    }
    if !matches!(params, Value::Null | Value::Array(_) | Value::Object(_)) {
        return Err(RelayError::InvalidParams(
            "params must be an array, an object, or null".to_string(),
        ));
    }
    Ok(())
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: Option<Arc<NetworkRegistry>>,
    cache: Option<Arc<dyn CacheBackend>>,
    cache_config: CacheConfig,
    invoker: Option<Arc<dyn UpstreamInvoker>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            cache: None,
            cache_config: CacheConfig::default(),
            invoker: None,
            telemetry: None,
        }
    }

    /// Set the network registry (required).
    pub fn registry(mut self, registry: impl Into<Arc<NetworkRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Configure the default in-memory cache. Ignored when a custom
    /// backend is set with [`cache_backend()`](Self::cache_backend).
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Use a custom cache backend.
    pub fn cache_backend(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a custom upstream invoker (default: [`HttpInvoker`]).
    pub fn invoker(mut self, invoker: Arc<dyn UpstreamInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Use a custom telemetry sink (default: [`MetricsSink`]).
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Build the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] if no registry was set or the
    /// default HTTP client cannot be created.
    pub fn build(self) -> Result<Dispatcher> {
        let registry = self.registry.ok_or_else(|| {
            RelayError::Configuration("dispatcher requires a network registry".to_string())
        })?;
        let invoker = match self.invoker {
            Some(invoker) => invoker,
            None => Arc::new(HttpInvoker::new()?),
        };
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ResponseCache::new(&self.cache_config)));
        Ok(Dispatcher {
            registry,
            cache,
            invoker,
            telemetry: self.telemetry.unwrap_or_else(|| Arc::new(MetricsSink)),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_rejects_empty_method() {
        let err = validate_request("  ", &Value::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Client);
    }

    #[test]
    fn validate_rejects_scalar_params() {
        let err = validate_request("getBalance", &json!("addr")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn validate_accepts_structured_params() {
        assert!(validate_request("getBalance", &json!(["addr"])).is_ok());
        assert!(validate_request("getBlock", &json!({"slot": 100})).is_ok());
        assert!(validate_request("getSlot", &Value::Null).is_ok());
    }

    #[test]
    fn build_requires_registry() {
        assert!(matches!(
            Dispatcher::builder().build(),
            Err(RelayError::Configuration(_))
        ));
    }
}
