//! Deterministic cache keys.

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;

/// Cache key derived from (network, method, canonical params).
///
/// Object members are written in sorted key order at every nesting level,
/// so two parameter sets that differ only in member order produce the same
/// key. Array order is significant. Numbers keep the spelling they were
/// parsed with, so `[1]` and `[1.0]` are different keys. Network and method are length-prefixed,
/// which keeps the encoding injective: no choice of strings can make two
/// different triples collide.
///
/// The key holds the full canonical text rather than a hash, so equality is
/// exact and there are no collisions to reason about.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Build the key for a call.
    pub fn new(network: &str, method: &str, params: &Value) -> Self {
        let mut buf = String::with_capacity(network.len() + method.len() + 32);
        let _ = write!(buf, "{}:{}{}:{}", network.len(), network, method.len(), method);
        write_canonical(&mut buf, params);
        Self(Arc::from(buf))
    }

    /// Canonical text of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&&*self.0).finish()
    }
}

/// Write `value` as compact JSON with object members sorted by key.
fn write_canonical(buf: &mut String, value: &Value) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            // Scalars already have a single compact rendering.
            buf.push_str(&value.to_string());
        }
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(buf, item);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> = map.iter().collect();
            members.sort_unstable_by(|a, b| a.0.cmp(b.0));
            buf.push('{');
            for (i, (k, v)) in members.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                buf.push_str(&Value::String(k.clone()).to_string());
                buf.push(':');
                write_canonical(buf, v);
            }
            buf.push('}');
        }
    }
}
