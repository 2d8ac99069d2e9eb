//! Chainrelay error types.
//!
//! Every failure is a [`RelayError`] variant built in one step. Each variant
//! belongs to exactly one [`ErrorKind`], which fixes the protocol error code
//! returned to the client.
//!
//! Two renderings exist for every error:
//!
//! - `Display`: the internal detail, including endpoint addresses and
//!   transport errors. Only ever logged.
//! - [`RelayError::safe_message()`]: the client-displayable text. Never
//!   contains URLs, configuration values, or raw transport output.

use std::fmt;
use std::time::Duration;

/// Closed classification of failures.
///
/// `Client`, `Validation` and `Auth` are caused by the caller; `Network`,
/// `Rpc` and `Server` are caused by the upstream node or by chainrelay itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request caught before any network call.
    Client,
    /// Parameter shape accepted by the protocol layer but rejected here.
    Validation,
    /// Transport or timeout failure reaching the upstream node.
    Network,
    /// Upstream node returned a structured JSON-RPC error.
    Rpc,
    /// Missing or rejected credential.
    Auth,
    /// Internal invariant violation.
    Server,
}

impl ErrorKind {
    /// JSON-RPC error code for this kind.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Client => codes::INVALID_REQUEST,
            ErrorKind::Validation => codes::INVALID_PARAMS,
            ErrorKind::Auth => codes::UNAUTHORIZED,
            ErrorKind::Network => codes::UPSTREAM_UNAVAILABLE,
            ErrorKind::Rpc => codes::UPSTREAM_ERROR,
            ErrorKind::Server => codes::INTERNAL_ERROR,
        }
    }

    /// Code class string, e.g. `client/invalid-request`.
    pub fn class(self) -> &'static str {
        match self {
            ErrorKind::Client => "client/invalid-request",
            ErrorKind::Validation => "client/invalid-params",
            ErrorKind::Auth => "client/unauthorized",
            ErrorKind::Network => "server/upstream-unavailable",
            ErrorKind::Rpc => "server/upstream-error",
            ErrorKind::Server => "server/internal",
        }
    }

    /// Whether the caller caused this failure.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorKind::Client | ErrorKind::Validation | ErrorKind::Auth
        )
    }

    /// Short lowercase label used for metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Client => "client",
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Rpc => "rpc",
            ErrorKind::Auth => "auth",
            ErrorKind::Server => "server",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC error codes emitted by chainrelay.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const UNAUTHORIZED: i32 = -32001;
    pub const UPSTREAM_UNAVAILABLE: i32 = -32002;
    pub const UPSTREAM_ERROR: i32 = -32003;
}

/// Chainrelay error types.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // Caller errors
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("upstream rejected credentials for {network} (HTTP {status})")]
    Unauthorized { network: String, status: u16 },

    // Upstream transport errors
    #[error("upstream {network} timed out after {after:?}")]
    Timeout { network: String, after: Duration },

    #[error("transport error talking to {network}: {detail}")]
    Transport { network: String, detail: String },

    #[error("malformed response from {network}: {detail}")]
    MalformedResponse { network: String, detail: String },

    // Structured upstream error
    #[error("upstream {network} returned error {code}: {message}")]
    Rpc {
        network: String,
        code: i64,
        message: String,
    },

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::UnknownNetwork(_) | RelayError::InvalidRequest(_) => ErrorKind::Client,
            RelayError::InvalidParams(_) | RelayError::Json(_) => ErrorKind::Validation,
            RelayError::Unauthorized { .. } => ErrorKind::Auth,
            RelayError::Timeout { .. }
            | RelayError::Transport { .. }
            | RelayError::MalformedResponse { .. } => ErrorKind::Network,
            RelayError::Rpc { .. } => ErrorKind::Rpc,
            RelayError::Internal(_) | RelayError::Configuration(_) => ErrorKind::Server,
        }
    }

    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    /// Client-displayable message.
    ///
    /// Network identifiers are echoed back because the caller supplied them.
    /// Upstream RPC messages pass through [`redact()`].
    pub fn safe_message(&self) -> String {
        match self {
            RelayError::UnknownNetwork(network) => format!("unknown network '{network}'"),
            RelayError::InvalidRequest(reason) => format!("invalid request: {reason}"),
            RelayError::InvalidParams(reason) => format!("invalid params: {reason}"),
            RelayError::Json(_) => "invalid params: not valid JSON".to_string(),
            RelayError::Unauthorized { .. } => "upstream rejected credentials".to_string(),
            RelayError::Timeout { .. } => "upstream request timed out".to_string(),
            RelayError::Transport { .. } => "upstream network unreachable".to_string(),
            RelayError::MalformedResponse { .. } => {
                "upstream returned a malformed response".to_string()
            }
            RelayError::Rpc { code, message, .. } => {
                format!("upstream error {code}: {}", redact(message))
            }
            RelayError::Internal(_) | RelayError::Configuration(_) => {
                "internal server error".to_string()
            }
        }
    }

    /// Whether this error is an upstream timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Timeout { .. })
    }
}

/// Replace every whitespace-separated token containing `://` with `[redacted]`.
///
/// Upstream nodes sometimes echo their own endpoint or a backend address
/// inside error messages.
pub fn redact(message: &str) -> String {
    if !message.contains("://") {
        return message.to_string();
    }
    message
        .split(' ')
        .map(|token| {
            if token.contains("://") {
                "[redacted]"
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result type alias for chainrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_leaves_plain_messages_alone() {
        assert_eq!(redact("execution reverted"), "execution reverted");
    }

    #[test]
    fn redact_strips_urls() {
        assert_eq!(
            redact("backend https://10.0.0.4:8545/key failed"),
            "backend [redacted] failed"
        );
        assert_eq!(redact("ws://node"), "[redacted]");
    }
}
