//! Gateway configuration
//!
//! Configuration is resolved once at startup: an optional YAML file named by
//! `GATEWAY_CONFIG`, then individual environment variables on top of it.
//! Variables missing from the process environment are looked up in a `.env`
//! file in the working directory, if there is one.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface to bind
    pub host: String,

    /// Listening port
    pub port: u16,

    /// Origin for the `/api/app-api` route
    pub app_service_url: String,

    /// Origin for the `/api/products` route
    pub products_service_url: String,

    /// Value of the default `X-APP-PACKAGE-NAME` header sent to app-service
    pub app_package_name: String,

    /// Upstream connect timeout; unset means no timeout
    pub connect_timeout_secs: Option<u64>,

    /// Probe request timeout; unset means no timeout
    pub probe_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            app_service_url: "http://app-service:4000".to_string(),
            products_service_url: "http://products-service:4000".to_string(),
            app_package_name: "your_default_package_name".to_string(),
            connect_timeout_secs: None,
            probe_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// `.env` for unset variables.
    pub fn load() -> Result<Self> {
        let dotenv = read_env_file(".env")?;
        if !dotenv.is_empty() {
            tracing::debug!(vars = dotenv.len(), "Loaded .env file");
        }

        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned()))
    }

    /// Load configuration using `lookup` in place of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("GATEWAY_CONFIG").filter(|p| !p.is_empty()) {
            Some(path) => Self::from_yaml_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_overrides(&lookup);
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST").filter(|v| !v.is_empty()) {
            self.host = host;
        }

        // An unusable PORT falls back to the default rather than whatever the file said
        if let Some(raw) = lookup("PORT") {
            self.port = match raw.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(value = %raw, "Ignoring invalid PORT, using {}", DEFAULT_PORT);
                    DEFAULT_PORT
                }
            };
        }

        if let Some(url) = lookup("APP_SERVICE_URL").filter(|v| !v.is_empty()) {
            self.app_service_url = url;
        }
        if let Some(url) = lookup("PRODUCTS_SERVICE_URL").filter(|v| !v.is_empty()) {
            self.products_service_url = url;
        }
        if let Some(name) = lookup("APP_PACKAGE_NAME").filter(|v| !v.is_empty()) {
            self.app_package_name = name;
        }

        if let Some(secs) = parse_secs(lookup, "UPSTREAM_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = Some(secs);
        }
        if let Some(secs) = parse_secs(lookup, "PROBE_TIMEOUT_SECS") {
            self.probe_timeout_secs = Some(secs);
        }
    }

    /// Socket address string to bind the listener to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid timeout");
            None
        }
    }
}

/// Reads `KEY=value` pairs from a dotenv file. A missing file yields an
/// empty map; an unreadable or malformed one is an error.
pub fn read_env_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(HashMap::new());
    }

    dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .map(|item| item.with_context(|| format!("Invalid entry in {}", path.display())))
        .collect()
}
