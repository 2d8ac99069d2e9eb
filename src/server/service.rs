//! Tool-call bridge: maps JSON-RPC requests onto the [`Dispatcher`].

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::protocol::{Request, Response};
use crate::error::codes;
use crate::network::NetworkEndpoint;
use crate::{Dispatcher, Outcome, RelayError, Result};

/// Tool protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name of the single tool exposed by the bridge.
pub const RPC_TOOL: &str = "rpc_call";

/// Produces a fresh set of endpoints for `relay/reload`. Runs on the
/// blocking pool, so it may read files.
pub type Reloader = Arc<dyn Fn() -> Result<Vec<NetworkEndpoint>> + Send + Sync>;

#[derive(Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct RpcArguments {
    network: String,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Serves the bridge's JSON-RPC methods.
pub struct RelayService {
    dispatcher: Arc<Dispatcher>,
    reloader: Option<Reloader>,
}

impl RelayService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            reloader: None,
        }
    }

    /// Enable `relay/reload`.
    pub fn with_reloader(mut self, reloader: Reloader) -> Self {
        self.reloader = Some(reloader);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one raw line. Returns the serialized reply, or `None` for
    /// notifications.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await?,
            Err(e) => {
                debug!(error = %e, "unparseable request line");
                Response::error(Value::Null, codes::PARSE_ERROR, format!("Parse error: {e}"))
            }
        };
        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "failed to serialize response");
                None
            }
        }
    }

    /// Handle one request. Notifications are executed but get no reply.
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let notification = request.is_notification();
        let id = request.id.clone();
        let params = request.params.unwrap_or(Value::Null);

        let reply = match request.method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(params).await,
            "relay/stats" => Ok(self.stats()),
            "relay/clear_cache" => {
                self.dispatcher.clear_cache();
                Ok(json!({ "cleared": true }))
            }
            "relay/reload" => self.reload().await,
            method if method.starts_with("notifications/") => {
                debug!(method, "notification");
                return None;
            }
            method => {
                return (!notification).then(|| {
                    Response::error(
                        id,
                        codes::METHOD_NOT_FOUND,
                        format!("Method not found: {method}"),
                    )
                });
            }
        };

        if notification {
            return None;
        }
        Some(match reply {
            Ok(result) => Response::success(id, result),
            Err(e) => Response::relay_error(id, &e),
        })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "chainrelay",
                "version": crate::version_string(),
            },
        })
    }

    fn list_tools(&self) -> Value {
        let networks = self.dispatcher.registry().network_ids();
        json!({
            "tools": [{
                "name": RPC_TOOL,
                "description": "Call a JSON-RPC method on a configured blockchain network. \
                                Responses may be served from cache.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "network": { "type": "string", "enum": networks },
                        "method": { "type": "string" },
                        "params": { "type": ["array", "object", "null"] },
                    },
                    "required": ["network", "method"],
                },
            }],
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value> {
        let call: ToolCall = serde_json::from_value(params)
            .map_err(|e| RelayError::InvalidRequest(format!("malformed tools/call: {e}")))?;
        if call.name != RPC_TOOL {
            return Err(RelayError::InvalidParams(format!(
                "unknown tool '{}'",
                call.name
            )));
        }
        let args: RpcArguments = serde_json::from_value(call.arguments)
            .map_err(|e| RelayError::InvalidParams(format!("malformed arguments: {e}")))?;

        match self
            .dispatcher
            .handle(&args.method, &args.network, &args.params)
            .await
        {
            Outcome::Success {
                payload,
                served_from,
                latency,
            } => Ok(json!({
                "content": [{ "type": "text", "text": payload.to_string() }],
                "structuredContent": {
                    "result": payload.as_ref(),
                    "servedFrom": served_from.as_str(),
                    "latencyMs": latency.as_secs_f64() * 1000.0,
                },
                "isError": false,
            })),
            Outcome::Failure { error, .. } => Err(error),
        }
    }

    fn stats(&self) -> Value {
        let registry = self.dispatcher.registry();
        let networks: serde_json::Map<String, Value> = registry
            .network_ids()
            .into_iter()
            .filter_map(|id| {
                let health = registry.health(&id)?;
                Some((id, json!(health)))
            })
            .collect();
        json!({
            "cache": self.dispatcher.cache_stats(),
            "networks": networks,
        })
    }

    async fn reload(&self) -> Result<Value> {
        let reloader = self.reloader.clone().ok_or_else(|| {
            RelayError::InvalidRequest("reload is not enabled".to_string())
        })?;
        let endpoints = tokio::task::spawn_blocking(move || reloader())
            .await
            .map_err(|e| RelayError::Internal(format!("reload task failed: {e}")))??;
        let count = endpoints.len();
        self.dispatcher.registry().reload(endpoints);
        info!(networks = count, "reload requested over protocol channel");
        Ok(json!({ "networks": count }))
    }
}
