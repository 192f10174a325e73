//! Status probe endpoint
//!
//! `GET /get-status-code?url=<url>` sends a single HEAD request to `url` and
//! reports the status code the remote answered with. Any answer counts as a
//! successful probe, including 4xx and 5xx.

use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;

pub const STATUS_PATH: &str = "/get-status-code";

pub const MISSING_URL_MESSAGE: &str = "URL parameter is required";

/// Why a probe produced no status code.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The request could not be built: malformed URL, unsupported scheme.
    #[error("Error setting up the request")]
    Setup(#[source] reqwest::Error),

    /// The request went out but nothing came back: DNS, refused, reset, timeout.
    #[error("No response received from the server")]
    NoResponse(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ProbeError::Setup(err)
        } else {
            ProbeError::NoResponse(err)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub status_code: u16,
}

#[derive(Debug, Clone)]
pub struct StatusProber {
    client: reqwest::Client,
}

impl StatusProber {
    /// Build a prober. With no `timeout` a probe waits on the remote
    /// indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        // Probes go direct, the same way proxied requests do
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(limit) = timeout {
            builder = builder.timeout(limit);
        }

        let client = builder.build().context("Failed to create probe HTTP client")?;
        Ok(Self { client })
    }

    /// Issue one HEAD request to `url`.
    pub async fn probe(&self, url: &str) -> Result<ProbeResult, ProbeError> {
        let response = self.client.head(url).send().await?;
        Ok(ProbeResult {
            status_code: response.status().as_u16(),
        })
    }

    pub async fn handle(&self, request: &Request) -> Response {
        let url = match request.query_param("url").filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => return Response::text(StatusCode::BadRequest, MISSING_URL_MESSAGE),
        };

        match self.probe(&url).await {
            Ok(result) => {
                tracing::info!(url = %url, status = result.status_code, "Probe completed");
                Response::json(StatusCode::Ok, &result)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = ?e, "Probe failed");
                Response::text(StatusCode::InternalServerError, e.to_string())
            }
        }
    }
}
