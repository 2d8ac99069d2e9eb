//! Named upstream networks and their per-method TTL tables.
//!
//! A [`NetworkRegistry`] holds an immutable table of [`NetworkEndpoint`]s.
//! Lookups read the current table through `ArcSwap` with no per-call
//! locking. [`NetworkRegistry::reload()`] replaces the whole table at once;
//! calls already in flight keep the `Arc<NetworkEndpoint>` they resolved.
//!
//! # TTL resolution
//!
//! `ttl_for(network, method)` checks, in order:
//!
//! 1. the network's method table,
//! 2. the network's own default TTL,
//! 3. the registry-wide default TTL.
//!
//! A zero TTL means "never cache".

pub mod health;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use reqwest::Url;
use tracing::{info, warn};

use crate::{RelayError, Result};

pub use health::{EndpointHealth, HealthSnapshot};

/// Registry-wide TTL used when a network has no default of its own.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2);

/// Upstream request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One independently configured upstream RPC endpoint.
pub struct NetworkEndpoint {
    id: String,
    url: Url,
    method_ttls: HashMap<String, Duration>,
    default_ttl: Option<Duration>,
    timeout: Duration,
    api_key: Option<String>,
    health: EndpointHealth,
}

impl NetworkEndpoint {
    /// Start building an endpoint.
    pub fn builder(id: impl Into<String>, url: impl Into<String>) -> NetworkEndpointBuilder {
        NetworkEndpointBuilder {
            id: id.into(),
            url: url.into(),
            method_ttls: HashMap::new(),
            default_ttl: None,
            timeout: DEFAULT_TIMEOUT,
            api_key: None,
        }
    }

    /// Network identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Upstream base address. Never shown to clients.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Upstream request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Bearer credential for the upstream, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// This endpoint's failure state.
    pub fn health(&self) -> &EndpointHealth {
        &self.health
    }

    /// TTL configured on this network for `method`: the method entry, else
    /// the network default. `None` if the network configures neither.
    pub fn configured_ttl(&self, method: &str) -> Option<Duration> {
        self.method_ttls.get(method).copied().or(self.default_ttl)
    }
}

impl fmt::Debug for NetworkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkEndpoint")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("method_ttls", &self.method_ttls)
            .field("default_ttl", &self.default_ttl)
            .field("timeout", &self.timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Builder for [`NetworkEndpoint`].
pub struct NetworkEndpointBuilder {
    id: String,
    url: String,
    method_ttls: HashMap<String, Duration>,
    default_ttl: Option<Duration>,
    timeout: Duration,
    api_key: Option<String>,
}

impl NetworkEndpointBuilder {
    /// Set the TTL for one method. Zero disables caching for it.
    pub fn method_ttl(mut self, method: impl Into<String>, ttl: Duration) -> Self {
        self.method_ttls.insert(method.into(), ttl);
        self
    }

    /// Set this network's fallback TTL.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the upstream request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `Authorization: Bearer <key>` to the upstream.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Validate and build the endpoint.
    pub fn build(self) -> Result<NetworkEndpoint> {
        if self.id.trim().is_empty() {
            return Err(RelayError::Configuration(
                "network identifier must not be empty".to_string(),
            ));
        }
        let url = Url::parse(&self.url).map_err(|e| {
            RelayError::Configuration(format!("network '{}': invalid url: {e}", self.id))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RelayError::Configuration(format!(
                "network '{}': unsupported url scheme '{}'",
                self.id,
                url.scheme()
            )));
        }
        if self.timeout.is_zero() {
            return Err(RelayError::Configuration(format!(
                "network '{}': timeout must be greater than zero",
                self.id
            )));
        }
        Ok(NetworkEndpoint {
            id: self.id,
            url,
            method_ttls: self.method_ttls,
            default_ttl: self.default_ttl,
            timeout: self.timeout,
            api_key: self.api_key,
            health: EndpointHealth::default(),
        })
    }
}

type NetworkTable = HashMap<String, Arc<NetworkEndpoint>>;

fn into_table(endpoints: impl IntoIterator<Item = NetworkEndpoint>) -> NetworkTable {
    let mut table = NetworkTable::new();
    for endpoint in endpoints {
        let id = endpoint.id.clone();
        if table.insert(id.clone(), Arc::new(endpoint)).is_some() {
            warn!(network = %id, "duplicate network identifier, later entry wins");
        }
    }
    table
}

/// Table of configured networks. See module docs.
pub struct NetworkRegistry {
    networks: ArcSwap<NetworkTable>,
    default_ttl: Duration,
}

impl NetworkRegistry {
    /// Create a registry from a set of endpoints.
    pub fn new(endpoints: impl IntoIterator<Item = NetworkEndpoint>) -> Self {
        Self {
            networks: ArcSwap::from_pointee(into_table(endpoints)),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Set the registry-wide fallback TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Registry-wide fallback TTL.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a network.
    pub fn resolve(&self, network: &str) -> Result<Arc<NetworkEndpoint>> {
        self.networks
            .load()
            .get(network)
            .cloned()
            .ok_or_else(|| RelayError::UnknownNetwork(network.to_string()))
    }

    /// TTL for `method` on `network`. Zero means "never cache".
    pub fn ttl_for(&self, network: &str, method: &str) -> Result<Duration> {
        let endpoint = self.resolve(network)?;
        Ok(self.ttl_for_endpoint(&endpoint, method))
    }

    /// TTL for `method` on an already resolved endpoint.
    pub fn ttl_for_endpoint(&self, endpoint: &NetworkEndpoint, method: &str) -> Duration {
        endpoint.configured_ttl(method).unwrap_or(self.default_ttl)
    }

    /// Replace the whole network table atomically.
    pub fn reload(&self, endpoints: impl IntoIterator<Item = NetworkEndpoint>) {
        let table = into_table(endpoints);
        let count = table.len();
        self.networks.store(Arc::new(table));
        info!(networks = count, "network table reloaded");
    }

    /// Configured network identifiers, sorted.
    pub fn network_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.networks.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Health snapshot for a network.
    pub fn health(&self, network: &str) -> Option<HealthSnapshot> {
        self.networks
            .load()
            .get(network)
            .map(|endpoint| endpoint.health.snapshot())
    }

    /// Number of configured networks.
    pub fn len(&self) -> usize {
        self.networks.load().len()
    }

    /// Whether no networks are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for NetworkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkRegistry")
            .field("networks", &self.network_ids())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_bad_url() {
        let err = NetworkEndpoint::builder("mainnet", "not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn builder_rejects_non_http_scheme() {
        let err = NetworkEndpoint::builder("mainnet", "ftp://node.example")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unsupported url scheme"));
    }

    #[test]
    fn builder_rejects_empty_id() {
        assert!(
            NetworkEndpoint::builder(" ", "http://node.example")
                .build()
                .is_err()
        );
    }

    #[test]
    fn debug_hides_api_key() {
        let endpoint = NetworkEndpoint::builder("mainnet", "http://node.example")
            .api_key("secret-key")
            .build()
            .unwrap();
        let rendered = format!("{endpoint:?}");
        assert!(!rendered.contains("secret-key"));
    }
}
