//! JSON-RPC 2.0 over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::UpstreamInvoker;
use crate::network::NetworkEndpoint;
use crate::{RelayError, Result};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Invoker that POSTs JSON-RPC 2.0 requests to the endpoint's URL.
///
/// One shared `reqwest` client (and connection pool) serves every network.
/// Timeouts are enforced per call by
/// [`call_with_timeout()`](super::call_with_timeout), not on the client.
pub struct HttpInvoker {
    http: Client,
    next_id: AtomicU64,
}

impl HttpInvoker {
    /// Create an invoker with a default HTTP client.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("chainrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http))
    }

    /// Create an invoker around an existing client.
    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            next_id: AtomicU64::new(1),
        }
    }

    fn transport(endpoint: &NetworkEndpoint, detail: impl Into<String>) -> RelayError {
        RelayError::Transport {
            network: endpoint.id().to_string(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl UpstreamInvoker for HttpInvoker {
    async fn call(
        &self,
        endpoint: &NetworkEndpoint,
        method: &str,
        params: &Value,
    ) -> Result<Value> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut request = self.http.post(endpoint.url().clone()).json(&body);
        if let Some(key) = endpoint.api_key() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RelayError::Timeout {
                    network: endpoint.id().to_string(),
                    after: endpoint.timeout(),
                }
            } else {
                Self::transport(endpoint, e.to_string())
            }
        })?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(RelayError::Unauthorized {
                network: endpoint.id().to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::transport(endpoint, e.to_string()))?;

        let parsed: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) if status.is_success() => {
                return Err(RelayError::MalformedResponse {
                    network: endpoint.id().to_string(),
                    detail: e.to_string(),
                });
            }
            Err(_) => return Err(Self::transport(endpoint, format!("HTTP {status}"))),
        };

        let Value::Object(mut envelope) = parsed else {
            return Err(RelayError::MalformedResponse {
                network: endpoint.id().to_string(),
                detail: "response is not a JSON object".to_string(),
            });
        };

        // A structured error wins over the HTTP status: nodes commonly send
        // JSON-RPC errors with 4xx/5xx codes.
        if let Some(error) = envelope.remove("error").filter(|e| !e.is_null()) {
            let error: RpcErrorObject =
                serde_json::from_value(error).map_err(|e| RelayError::MalformedResponse {
                    network: endpoint.id().to_string(),
                    detail: format!("invalid error object: {e}"),
                })?;
            return Err(RelayError::Rpc {
                network: endpoint.id().to_string(),
                code: error.code,
                message: error.message,
            });
        }

        if !status.is_success() {
            return Err(Self::transport(endpoint, format!("HTTP {status}")));
        }

        // `"result": null` is a valid answer (e.g. unknown transaction).
        envelope
            .remove("result")
            .ok_or_else(|| RelayError::MalformedResponse {
                network: endpoint.id().to_string(),
                detail: "response has neither result nor error".to_string(),
            })
    }
}
