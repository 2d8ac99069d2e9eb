//! Upstream round trips.
//!
//! An [`UpstreamInvoker`] performs exactly one network round trip to a
//! resolved [`NetworkEndpoint`]. It never retries: one dispatch miss means
//! one upstream attempt, which keeps cache population timing predictable.
//! The endpoint's timeout is enforced by [`call_with_timeout()`] for every
//! invoker implementation.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::network::NetworkEndpoint;
use crate::{RelayError, Result};

pub use http::HttpInvoker;

/// Performs one RPC round trip against an endpoint.
///
/// Implementations classify their failures:
///
/// - transport failures and malformed responses → `Transport` /
///   `MalformedResponse` (kind `Network`),
/// - structured error objects from the node → `Rpc`,
/// - rejected credentials → `Unauthorized`.
#[async_trait]
pub trait UpstreamInvoker: Send + Sync {
    /// Call `method` with `params` on `endpoint`, returning the node's result.
    async fn call(&self, endpoint: &NetworkEndpoint, method: &str, params: &Value)
    -> Result<Value>;
}

/// Run one invoker call bounded by the endpoint's timeout.
///
/// A call that outlives the timeout is dropped and reported as
/// [`RelayError::Timeout`].
pub async fn call_with_timeout(
    invoker: &dyn UpstreamInvoker,
    endpoint: &NetworkEndpoint,
    method: &str,
    params: &Value,
) -> Result<Value> {
    let limit = endpoint.timeout();
    match tokio::time::timeout(limit, invoker.call(endpoint, method, params)).await {
        Ok(result) => result,
        Err(_) => Err(RelayError::Timeout {
            network: endpoint.id().to_string(),
            after: limit,
        }),
    }
}
