//! FamGate: an approval-gated web proxy.
//!
//! The approval workflow lives in `famgate_core`; this crate holds the
//! HTTP gateway and its configuration.

pub mod config;
pub mod gateway;

pub use config::{ConfigError, GatewayConfig};
pub use gateway::{router, AppState, GatewayError};
