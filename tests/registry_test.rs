//! Tests for [`NetworkRegistry`]: TTL fallback, reload, per-network health.

use std::time::Duration;

use chainrelay::network::DEFAULT_TTL;
use chainrelay::{ErrorKind, NetworkEndpoint, NetworkRegistry};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn mainnet() -> NetworkEndpoint {
    NetworkEndpoint::builder("mainnet", "https://mainnet.rpc.example.org")
        .method_ttl("getBlock", secs(30))
        .method_ttl("getSlot", Duration::ZERO)
        .default_ttl(secs(5))
        .build()
        .unwrap()
}

fn devnet() -> NetworkEndpoint {
    NetworkEndpoint::builder("devnet", "http://127.0.0.1:8899")
        .method_ttl("getBlock", secs(1))
        .build()
        .unwrap()
}

// =========================================================================
// Resolution
// =========================================================================

#[test]
fn resolve_known_network() {
    let registry = NetworkRegistry::new([mainnet(), devnet()]);
    let endpoint = registry.resolve("devnet").unwrap();
    assert_eq!(endpoint.id(), "devnet");
    assert_eq!(endpoint.url().as_str(), "http://127.0.0.1:8899/");
}

#[test]
fn resolve_unknown_network_is_client_error() {
    let registry = NetworkRegistry::new([mainnet()]);
    let err = registry.resolve("testnet").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);
    assert_eq!(err.safe_message(), "unknown network 'testnet'");
}

#[test]
fn network_ids_are_sorted() {
    let registry = NetworkRegistry::new([mainnet(), devnet()]);
    assert_eq!(registry.network_ids(), vec!["devnet", "mainnet"]);
    assert_eq!(registry.len(), 2);
    assert!(!registry.is_empty());
}

// =========================================================================
// TTL fallback chain
// =========================================================================

#[test]
fn method_ttl_wins() {
    let registry = NetworkRegistry::new([mainnet()]);
    assert_eq!(registry.ttl_for("mainnet", "getBlock").unwrap(), secs(30));
}

#[test]
fn explicit_zero_ttl_is_kept() {
    let registry = NetworkRegistry::new([mainnet()]);
    assert_eq!(
        registry.ttl_for("mainnet", "getSlot").unwrap(),
        Duration::ZERO
    );
}

#[test]
fn network_default_then_registry_default() {
    let registry = NetworkRegistry::new([mainnet(), devnet()]);
    assert_eq!(registry.ttl_for("mainnet", "getBalance").unwrap(), secs(5));
    assert_eq!(registry.ttl_for("devnet", "getBalance").unwrap(), DEFAULT_TTL);
}

#[test]
fn registry_default_is_configurable() {
    let registry = NetworkRegistry::new([devnet()]).with_default_ttl(secs(9));
    assert_eq!(registry.default_ttl(), secs(9));
    assert_eq!(registry.ttl_for("devnet", "getBalance").unwrap(), secs(9));
}

#[test]
fn ttl_tables_are_per_network() {
    let registry = NetworkRegistry::new([mainnet(), devnet()]);
    assert_eq!(registry.ttl_for("mainnet", "getBlock").unwrap(), secs(30));
    assert_eq!(registry.ttl_for("devnet", "getBlock").unwrap(), secs(1));
}

#[test]
fn ttl_for_unknown_network_fails() {
    let registry = NetworkRegistry::new([mainnet()]);
    assert!(registry.ttl_for("testnet", "getBlock").is_err());
}

// =========================================================================
// Reload
// =========================================================================

#[test]
fn reload_replaces_the_whole_table() {
    let registry = NetworkRegistry::new([mainnet(), devnet()]);
    let replacement = NetworkEndpoint::builder("mainnet", "https://other.example.org")
        .build()
        .unwrap();

    registry.reload([replacement]);

    assert_eq!(registry.network_ids(), vec!["mainnet"]);
    assert!(registry.resolve("devnet").is_err());
    // The old method table went with the old endpoint.
    assert_eq!(registry.ttl_for("mainnet", "getBlock").unwrap(), DEFAULT_TTL);
}

#[test]
fn resolved_endpoint_survives_reload() {
    let registry = NetworkRegistry::new([mainnet()]);
    let in_flight = registry.resolve("mainnet").unwrap();

    registry.reload([devnet()]);

    assert_eq!(in_flight.id(), "mainnet");
    assert_eq!(in_flight.configured_ttl("getBlock"), Some(secs(30)));
}

#[test]
fn duplicate_ids_keep_the_later_entry() {
    let later = NetworkEndpoint::builder("mainnet", "https://later.example.org")
        .build()
        .unwrap();
    let registry = NetworkRegistry::new([mainnet(), later]);
    assert_eq!(
        registry.resolve("mainnet").unwrap().url().host_str(),
        Some("later.example.org")
    );
}

// =========================================================================
// Health
// =========================================================================

#[test]
fn health_is_tracked_per_network() {
    let registry = NetworkRegistry::new([mainnet(), devnet()]);
    let dev = registry.resolve("devnet").unwrap();
    dev.health().record_failure(Duration::from_millis(10));
    dev.health().record_failure(Duration::from_millis(10));

    let dev_health = registry.health("devnet").unwrap();
    assert_eq!(dev_health.failures, 2);
    assert_eq!(dev_health.consecutive_failures, 2);

    let main_health = registry.health("mainnet").unwrap();
    assert_eq!(main_health.failures, 0);
    assert_eq!(main_health.average_latency, None);

    assert!(registry.health("testnet").is_none());
}
