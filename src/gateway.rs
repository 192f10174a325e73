//! Request dispatch
//!
//! Every request runs through the pre-routing stages, then the prefix
//! router, then the status probe endpoint, and finally falls back to 404.

use crate::config::Config;
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::probe::{STATUS_PATH, StatusProber};
use crate::proxy::headers::{Stage, inject_gateway_header, run_stages};
use crate::proxy::router::Router;
use crate::proxy::upstream::{ProxyHandler, UpstreamResponse};
use anyhow::Result;

/// What the connection should send back.
pub enum Outcome {
    /// A response generated by the gateway itself
    Local(Response),
    /// An upstream response to relay verbatim
    Relay(UpstreamResponse),
}

pub struct Gateway {
    stages: Vec<Stage>,
    router: Router,
    proxy: ProxyHandler,
    prober: StatusProber,
}

impl Gateway {
    pub fn new(router: Router, proxy: ProxyHandler, prober: StatusProber) -> Self {
        Self {
            stages: vec![inject_gateway_header as Stage],
            router,
            proxy,
            prober,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(
            Router::from_config(cfg)?,
            ProxyHandler::new(cfg.connect_timeout()),
            StatusProber::new(cfg.probe_timeout())?,
        ))
    }

    pub fn preprocess(&self, request: Request) -> Request {
        run_stages(&self.stages, request)
    }

    pub async fn handle(&self, request: Request) -> Outcome {
        let request = self.preprocess(request);

        if let Some(rule) = self.router.route(request.route_path()) {
            return match self.proxy.forward(rule, &request).await {
                Ok(upstream) => Outcome::Relay(upstream),
                Err(e) => {
                    tracing::warn!(
                        rule = %rule.name,
                        error = %format!("{:#}", e),
                        method = request.method.as_str(),
                        path = %request.path,
                        "Failed to proxy request"
                    );
                    Outcome::Local(self.proxy.error_response(&e))
                }
            };
        }

        if request.route_path() == STATUS_PATH
            && matches!(request.method, Method::GET | Method::HEAD)
        {
            return Outcome::Local(self.prober.handle(&request).await);
        }

        tracing::debug!(method = request.method.as_str(), path = %request.path, "No route");
        Outcome::Local(Response::not_found())
    }
}
