//! Integration tests for the stdio bridge service.
//!
//! Drives [`RelayService`] one line at a time, exactly as the daemon does,
//! with a scripted upstream behind the dispatcher.

#![cfg(feature = "server")]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use chainrelay::server::{Config, RelayService, Request};
use chainrelay::{
    Dispatcher, NetworkEndpoint, NetworkRegistry, RelayError, Result, UpstreamInvoker,
};

// ============================================================================
// Fixtures
// ============================================================================

struct SlotInvoker {
    calls: AtomicU64,
}

#[async_trait]
impl UpstreamInvoker for SlotInvoker {
    async fn call(&self, endpoint: &NetworkEndpoint, method: &str, _params: &Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match (endpoint.id(), method) {
            ("devnet", _) => Err(RelayError::Transport {
                network: "devnet".into(),
                detail: "connection refused".into(),
            }),
            (_, "getBlock") => Err(RelayError::Rpc {
                network: endpoint.id().into(),
                code: -32007,
                message: "Slot 5 was skipped".into(),
            }),
            _ => Ok(json!(4242)),
        }
    }
}

const CONFIG: &str = r#"
    [networks.mainnet]
    url = "https://mainnet.rpc.example.org"

    [networks.mainnet.ttl]
    getSlot = 30

    [networks.devnet]
    url = "https://devnet.rpc.example.org"
"#;

fn service() -> (RelayService, Arc<SlotInvoker>) {
    let config = Config::parse(CONFIG).unwrap();
    let invoker = Arc::new(SlotInvoker {
        calls: AtomicU64::new(0),
    });
    let dispatcher = Dispatcher::builder()
        .registry(config.registry().unwrap())
        .cache_config(config.cache_config())
        .invoker(invoker.clone())
        .build()
        .unwrap();
    (RelayService::new(Arc::new(dispatcher)), invoker)
}

async fn send(service: &RelayService, request: Value) -> Value {
    let line = service
        .handle_line(&request.to_string())
        .await
        .expect("request with id gets a reply");
    serde_json::from_str(&line).unwrap()
}

fn tool_call(id: u64, network: &str, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": "rpc_call",
            "arguments": { "network": network, "method": method, "params": params },
        },
    })
}

// ============================================================================
// Protocol framing
// ============================================================================

#[tokio::test]
async fn initialize_reports_server_info() {
    let (service, _) = service();
    let reply = send(&service, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;

    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["serverInfo"]["name"], "chainrelay");
    assert!(reply["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn ping_replies_empty_object() {
    let (service, _) = service();
    let reply = send(&service, json!({"jsonrpc": "2.0", "id": "a", "method": "ping"})).await;
    assert_eq!(reply["id"], "a");
    assert_eq!(reply["result"], json!({}));
}

#[tokio::test]
async fn notifications_get_no_reply() {
    let (service, _) = service();
    let line = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    assert!(service.handle_line(&line).await.is_none());

    let request: Request =
        serde_json::from_value(json!({"jsonrpc": "2.0", "method": "ping"})).unwrap();
    assert!(service.handle(request).await.is_none());
}

#[tokio::test]
async fn unparseable_line_is_parse_error() {
    let (service, _) = service();
    let line = service.handle_line("{not json").await.unwrap();
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["id"], Value::Null);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let (service, _) = service();
    let reply = send(&service, json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"})).await;
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn tools_list_names_configured_networks() {
    let (service, _) = service();
    let reply = send(&service, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;

    let tool = &reply["result"]["tools"][0];
    assert_eq!(tool["name"], "rpc_call");
    assert_eq!(
        tool["inputSchema"]["properties"]["network"]["enum"],
        json!(["devnet", "mainnet"])
    );
}

// ============================================================================
// tools/call
// ============================================================================

#[tokio::test]
async fn tool_call_is_cached_on_second_request() {
    let (service, invoker) = service();

    let first = send(&service, tool_call(1, "mainnet", "getSlot", Value::Null)).await;
    let second = send(&service, tool_call(2, "mainnet", "getSlot", Value::Null)).await;

    assert_eq!(first["result"]["structuredContent"]["result"], 4242);
    assert_eq!(first["result"]["structuredContent"]["servedFrom"], "upstream");
    assert_eq!(second["result"]["structuredContent"]["servedFrom"], "cache");
    assert_eq!(second["result"]["content"][0]["text"], "4242");
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_rpc_error_maps_to_error_object() {
    let (service, _) = service();
    let reply = send(&service, tool_call(5, "mainnet", "getBlock", json!([5]))).await;

    let error = &reply["error"];
    assert_eq!(error["code"], -32003);
    assert_eq!(error["data"]["kind"], "rpc");
    assert_eq!(error["data"]["class"], "server/upstream-error");
    assert!(error["message"].as_str().unwrap().contains("-32007"));
    assert!(reply.get("result").is_none());
}

#[tokio::test]
async fn network_failure_hides_detail() {
    let (service, _) = service();
    let reply = send(&service, tool_call(6, "devnet", "getSlot", Value::Null)).await;

    assert_eq!(reply["error"]["code"], -32002);
    assert_eq!(reply["error"]["message"], "upstream network unreachable");
}

#[tokio::test]
async fn unknown_network_is_invalid_request() {
    let (service, invoker) = service();
    let reply = send(&service, tool_call(7, "testnet", "getSlot", Value::Null)).await;

    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(reply["error"]["data"]["class"], "client/invalid-request");
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_arguments_are_invalid_params() {
    let (service, _) = service();
    let reply = send(
        &service,
        json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "tools/call",
            "params": { "name": "rpc_call", "arguments": { "network": "mainnet" } },
        }),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn unknown_tool_is_invalid_params() {
    let (service, _) = service();
    let reply = send(
        &service,
        json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": { "name": "transfer", "arguments": {} },
        }),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32602);
}

// ============================================================================
// Administration
// ============================================================================

#[tokio::test]
async fn stats_and_clear_cache() {
    let (service, invoker) = service();
    send(&service, tool_call(1, "mainnet", "getSlot", Value::Null)).await;
    send(&service, tool_call(2, "mainnet", "getSlot", Value::Null)).await;

    let stats = send(&service, json!({"jsonrpc": "2.0", "id": 3, "method": "relay/stats"})).await;
    assert_eq!(stats["result"]["cache"]["hits"], 1);
    assert_eq!(stats["result"]["cache"]["entries"], 1);
    assert_eq!(stats["result"]["networks"]["mainnet"]["successes"], 1);

    let cleared =
        send(&service, json!({"jsonrpc": "2.0", "id": 4, "method": "relay/clear_cache"})).await;
    assert_eq!(cleared["result"]["cleared"], true);

    send(&service, tool_call(5, "mainnet", "getSlot", Value::Null)).await;
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn reload_without_reloader_is_rejected() {
    let (service, _) = service();
    let reply = send(&service, json!({"jsonrpc": "2.0", "id": 1, "method": "relay/reload"})).await;
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn reload_swaps_network_table() {
    let (service, _) = service();
    let service = service.with_reloader(Arc::new(|| -> Result<Vec<NetworkEndpoint>> {
        Ok(vec![
            NetworkEndpoint::builder("testnet", "https://testnet.rpc.example.org")
                .timeout(Duration::from_secs(3))
                .build()?,
        ])
    }));

    let reply = send(&service, json!({"jsonrpc": "2.0", "id": 1, "method": "relay/reload"})).await;
    assert_eq!(reply["result"]["networks"], 1);
    assert_eq!(service.dispatcher().registry().network_ids(), vec!["testnet"]);

    let reply = send(&service, tool_call(2, "mainnet", "getSlot", Value::Null)).await;
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn registry_built_from_config_matches_direct_build() {
    let config = Config::parse(CONFIG).unwrap();
    let registry = config.registry().unwrap();
    let direct = NetworkRegistry::new(config.endpoints().unwrap());
    assert_eq!(registry.network_ids(), direct.network_ids());
}
