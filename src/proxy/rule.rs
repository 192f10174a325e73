//! Proxy rules
//!
//! A rule pairs a literal path prefix with the upstream origin that serves
//! it and describes how the path is rewritten on the way out.

use crate::proxy::headers::DefaultHeaders;
use url::Url;

/// How a matched request path is rewritten before forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRewrite {
    /// Every path becomes this literal.
    Fixed(String),
    /// The prefix is removed and the remainder forwarded.
    StripPrefix(String),
}

impl PathRewrite {
    /// Rewrites a path that carries no query string.
    pub fn apply(&self, path: &str) -> String {
        match self {
            PathRewrite::Fixed(target) => target.clone(),
            PathRewrite::StripPrefix(prefix) => {
                let rest = path.strip_prefix(prefix.as_str()).unwrap_or(path);
                if rest.is_empty() {
                    "/".to_string()
                } else if rest.starts_with('/') {
                    rest.to_string()
                } else {
                    format!("/{}", rest)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyRule {
    /// Short name used in logs
    pub name: String,

    /// Literal prefix matched against the inbound path
    pub path_prefix: String,

    /// Upstream origin, e.g. `http://app-service:4000`
    pub target: Url,

    pub rewrite: PathRewrite,

    pub default_headers: DefaultHeaders,

    /// Log the outbound header set after defaults are applied
    pub log_outbound_headers: bool,
}

impl ProxyRule {
    pub fn new(
        name: impl Into<String>,
        path_prefix: impl Into<String>,
        target: Url,
        rewrite: PathRewrite,
    ) -> Self {
        Self {
            name: name.into(),
            path_prefix: path_prefix.into(),
            target,
            rewrite,
            default_headers: DefaultHeaders::new(),
            log_outbound_headers: false,
        }
    }

    pub fn with_default_headers(mut self, headers: DefaultHeaders) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn with_header_logging(mut self) -> Self {
        self.log_outbound_headers = true;
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.path_prefix)
    }

    /// Rewrites a raw request target (path plus optional query). The query
    /// string is re-attached untouched.
    pub fn rewrite_target(&self, target: &str) -> String {
        match target.split_once('?') {
            Some((path, query)) => format!("{}?{}", self.rewrite.apply(path), query),
            None => self.rewrite.apply(target),
        }
    }

    /// `host[:port]` to present to the upstream as the Host header.
    pub fn upstream_host(&self) -> Option<String> {
        let host = self.target.host_str()?;
        Some(match self.target.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// Address to open a TCP connection to.
    pub fn upstream_addr(&self) -> Option<String> {
        let host = self.target.host_str()?;
        let port = self.target.port_or_known_default()?;
        Some(format!("{}:{}", host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_prefix_keeps_remainder_rooted() {
        let rewrite = PathRewrite::StripPrefix("/api/products".to_string());

        assert_eq!(rewrite.apply("/api/products/widgets/42"), "/widgets/42");
        assert_eq!(rewrite.apply("/api/products"), "/");
        assert_eq!(rewrite.apply("/api/products/"), "/");
        assert_eq!(rewrite.apply("/api/productsale"), "/ale");
    }

    #[test]
    fn upstream_addr_uses_scheme_default_port() {
        let rule = ProxyRule::new(
            "plain",
            "/",
            Url::parse("http://backend.local").unwrap(),
            PathRewrite::StripPrefix(String::new()),
        );

        assert_eq!(rule.upstream_addr().as_deref(), Some("backend.local:80"));
        assert_eq!(rule.upstream_host().as_deref(), Some("backend.local"));
    }
}
