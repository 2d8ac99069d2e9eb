//! Chainrelay - caching bridge between tool-calling clients and blockchain RPC nodes
//!
//! This crate provides the dispatch and caching layer of a protocol bridge:
//! a [`Dispatcher`] receives a validated RPC invocation, serves it from the
//! response cache when a fresh entry exists, otherwise routes it to the
//! configured upstream network, and normalizes the result into an
//! [`Outcome`] with a fixed error taxonomy.
//!
//! Each network is configured independently (URL, per-method TTLs, timeout)
//! so a failing endpoint never affects the others.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use chainrelay::{CacheConfig, Dispatcher, NetworkEndpoint, NetworkRegistry};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> chainrelay::Result<()> {
//!     let mainnet = NetworkEndpoint::builder("mainnet", "https://rpc.example.org")
//!         .method_ttl("getBlock", Duration::from_secs(30))
//!         .method_ttl("sendTransaction", Duration::ZERO)
//!         .build()?;
//!
//!     let dispatcher = Dispatcher::builder()
//!         .registry(NetworkRegistry::new([mainnet]))
//!         .cache_config(CacheConfig::new().capacity(10_000))
//!         .build()?;
//!
//!     let outcome = dispatcher
//!         .handle("getBlock", "mainnet", &json!([100]))
//!         .await;
//!     println!("{:?} in {:?}", outcome.served_from(), outcome.latency());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod dispatch;
pub mod error;
pub mod network;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;
pub mod upstream;
mod version;

// Re-export main types at crate root
pub use cache::{CacheBackend, CacheConfig, CacheKey, CacheStats, ResponseCache};
pub use dispatch::{Dispatcher, DispatcherBuilder, Outcome, ServedFrom};
pub use error::{ErrorKind, RelayError, Result};
pub use network::{NetworkEndpoint, NetworkRegistry};
pub use telemetry::{CallEvent, MetricsSink, TelemetrySink};
pub use upstream::{HttpInvoker, UpstreamInvoker};
pub use version::{PKG_VERSION, version_string};
