//! Reverse proxy functionality
//!
//! Prefix routing, path rewriting, header injection and request forwarding
//! to the upstream services.

pub mod headers;
pub mod router;
pub mod rule;
pub mod upstream;

pub use headers::{DefaultHeaders, Stage};
pub use router::Router;
pub use rule::{PathRewrite, ProxyRule};
pub use upstream::{ProxyHandler, UpstreamResponse};
