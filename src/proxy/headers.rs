//! Request header stages
//!
//! Inbound requests pass through an ordered list of [`Stage`]s before any
//! routing decision. Outbound requests to an upstream may additionally get a
//! rule's [`DefaultHeaders`].

use crate::http::request::Request;

/// Identity header stamped on every inbound request.
pub const GATEWAY_HEADER: &str = "X-API-GATEWAY";
pub const GATEWAY_ID: &str = "NODE-1.0";

pub const APP_PACKAGE_HEADER: &str = "X-APP-PACKAGE-NAME";

/// A pre-routing request transformation.
pub type Stage = fn(Request) -> Request;

/// Sets `X-API-GATEWAY: NODE-1.0`, replacing any client-supplied value.
pub fn inject_gateway_header(mut request: Request) -> Request {
    request.set_header(GATEWAY_HEADER, GATEWAY_ID);
    request
}

/// Runs `request` through `stages` in order.
pub fn run_stages(stages: &[Stage], request: Request) -> Request {
    stages.iter().fold(request, |req, stage| stage(req))
}

/// Headers added to an outbound request only when it lacks them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultHeaders {
    entries: Vec<(String, String)>,
}

impl DefaultHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fills in every default the request does not already carry.
    pub fn apply(&self, request: &mut Request) {
        for (name, value) in self.iter() {
            if !request.has_header(name) {
                request.set_header(name, value);
            }
        }
    }
}
