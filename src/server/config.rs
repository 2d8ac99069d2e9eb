//! Configuration loading for chainrelayd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.chainrelay/config.toml` (user)
//! 3. `/etc/chainrelay/config.toml` (system)
//!
//! ```toml
//! [cache]
//! max_entries = 10000
//!
//! [defaults]
//! ttl_secs = 2
//! timeout_secs = 30
//!
//! [networks.mainnet]
//! url = "https://rpc.example.org"
//! api_key_env = "MAINNET_RPC_KEY"
//!
//! [networks.mainnet.ttl]
//! getBlock = 30
//! sendTransaction = 0
//! ```
//!
//! API keys are never written in the file; `api_key_env` names the
//! environment variable holding the key.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::error;

use crate::cache::CacheConfig;
use crate::network::{NetworkEndpoint, NetworkRegistry};
use crate::{RelayError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Capacity in cost units (default: 10,000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Charge entries by serialized size instead of one unit each.
    #[serde(default)]
    pub weigh_by_bytes: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            weigh_by_bytes: false,
        }
    }
}

fn default_max_entries() -> u64 {
    10_000
}

/// Process-wide fallbacks.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    /// TTL for networks without their own default (default: 2).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Upstream timeout for networks without their own (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    2
}

fn default_timeout_secs() -> u64 {
    30
}

/// One `[networks.<id>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub url: String,
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Name of the environment variable holding the bearer key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Method name → TTL seconds. 0 disables caching for that method.
    #[serde(default)]
    pub ttl: BTreeMap<String, u64>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.chainrelay/config.toml`
    /// 3. `/etc/chainrelay/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            RelayError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| match e {
            RelayError::Configuration(msg) => {
                RelayError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RelayError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(RelayError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".chainrelay").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/chainrelay/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(RelayError::Configuration(
            "No config file found. Create ~/.chainrelay/config.toml or /etc/chainrelay/config.toml"
                .to_string(),
        ))
    }

    /// Response cache configuration.
    pub fn cache_config(&self) -> CacheConfig {
        let config = CacheConfig::new().capacity(self.cache.max_entries);
        if self.cache.weigh_by_bytes {
            config.byte_weighted()
        } else {
            config
        }
    }

    /// Build every valid network endpoint.
    ///
    /// Each network is validated on its own: an invalid entry is logged and
    /// skipped, and never prevents the others from loading. Fails only if
    /// no network survives.
    pub fn endpoints(&self) -> Result<Vec<NetworkEndpoint>> {
        let mut endpoints = Vec::with_capacity(self.networks.len());
        for (id, network) in &self.networks {
            match self.build_endpoint(id, network) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => error!(network = %id, error = %e, "network rejected"),
            }
        }
        if endpoints.is_empty() {
            return Err(RelayError::Configuration(
                "no valid networks configured".to_string(),
            ));
        }
        Ok(endpoints)
    }

    /// Build the network registry.
    pub fn registry(&self) -> Result<NetworkRegistry> {
        Ok(NetworkRegistry::new(self.endpoints()?)
            .with_default_ttl(Duration::from_secs(self.defaults.ttl_secs)))
    }

    fn build_endpoint(&self, id: &str, network: &NetworkConfig) -> Result<NetworkEndpoint> {
        let timeout = network.timeout_secs.unwrap_or(self.defaults.timeout_secs);
        let mut builder = NetworkEndpoint::builder(id, &network.url)
            .timeout(Duration::from_secs(timeout));
        if let Some(secs) = network.default_ttl_secs {
            builder = builder.default_ttl(Duration::from_secs(secs));
        }
        for (method, secs) in &network.ttl {
            builder = builder.method_ttl(method, Duration::from_secs(*secs));
        }
        if let Some(var) = &network.api_key_env {
            let key = std::env::var(var).map_err(|_| {
                RelayError::Configuration(format!(
                    "network '{id}': environment variable {var} is not set"
                ))
            })?;
            builder = builder.api_key(key);
        }
        builder.build()
    }
}
