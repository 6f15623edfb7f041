//! HTTP gateway for the Parley client.
//!
//! Implements `parley_core::session::BackendGateway` against the
//! task-dispatch backend's REST API.

pub mod config;
pub mod http_gateway;

pub use config::GatewayConfig;
pub use http_gateway::HttpGateway;
