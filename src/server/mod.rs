//! Stdio bridge daemon support.
//!
//! This module provides:
//! - Configuration types (`config`)
//! - JSON-RPC 2.0 envelope types (`protocol`)
//! - The tool-call service mapping requests onto the dispatcher (`service`)
//!
//! # Transport
//!
//! Only the line-delimited stdio channel is implemented. `RelayService`
//! works on individual lines, so an HTTP transport can reuse it unchanged.

pub mod config;
pub mod protocol;
pub mod service;

pub use config::Config;
pub use protocol::{ErrorObject, Request, Response};
pub use service::RelayService;
