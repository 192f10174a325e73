//! api-gateway - a small configurable reverse proxy
//!
//! Forwards requests to upstream services by path prefix and exposes a
//! status probe endpoint.

pub mod config;
pub mod gateway;
pub mod http;
pub mod probe;
pub mod proxy;
pub mod server;
