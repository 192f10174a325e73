//! Prefix routing
//!
//! Rules are evaluated top to bottom and the first literal prefix match
//! wins. The table is built once at startup and only read afterwards.

use crate::config::Config;
use crate::proxy::headers::{APP_PACKAGE_HEADER, DefaultHeaders};
use crate::proxy::rule::{PathRewrite, ProxyRule};
use anyhow::{Context, Result};
use url::Url;

pub const APP_API_PREFIX: &str = "/api/app-api";
pub const PRODUCTS_PREFIX: &str = "/api/products";

/// Outbound path for every request on the app-api route.
pub const APP_API_FIXED_PATH: &str = "/api/app-api/";

#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<ProxyRule>,
}

impl Router {
    pub fn new(rules: Vec<ProxyRule>) -> Self {
        Self { rules }
    }

    /// The gateway's route table: app-api first, then products.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let app_origin = parse_origin(&cfg.app_service_url)?;
        let products_origin = parse_origin(&cfg.products_service_url)?;

        let app_api = ProxyRule::new(
            "app-api",
            APP_API_PREFIX,
            app_origin,
            PathRewrite::Fixed(APP_API_FIXED_PATH.to_string()),
        )
        .with_default_headers(
            DefaultHeaders::new().with(APP_PACKAGE_HEADER, cfg.app_package_name.clone()),
        )
        .with_header_logging();

        let products = ProxyRule::new(
            "products",
            PRODUCTS_PREFIX,
            products_origin,
            PathRewrite::StripPrefix(PRODUCTS_PREFIX.to_string()),
        );

        Ok(Self::new(vec![app_api, products]))
    }

    /// First rule whose prefix matches `path` (query string excluded).
    pub fn route(&self, path: &str) -> Option<&ProxyRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> &[ProxyRule] {
        &self.rules
    }
}

fn parse_origin(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid upstream URL: {}", raw))?;
    if url.scheme() != "http" {
        anyhow::bail!("Unsupported upstream scheme in {}: only http is proxied", raw);
    }
    if url.host_str().is_none() {
        anyhow::bail!("Upstream URL missing host: {}", raw);
    }
    Ok(url)
}
