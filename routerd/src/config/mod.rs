//! Configuration loading.
//!
//! The whole daemon is configured from a single JSON file loaded at startup:
//!
//! ```json
//! {
//!   "port": 8080,
//!   "threads": 10,
//!   "hosts": { "auth": ["10.0.0.1:9000", "10.0.0.2:9000"] },
//!   "graphs": {
//!     "main": {
//!       "services": [ "auth", { "name": "news", "path": "/v2/news" } ],
//!       "deps": [ { "a": "news", "b": "auth" } ]
//!     }
//!   },
//!   "routes": [ { "r": "/", "g": "main" } ]
//! }
//! ```
//!
//! Parsing and cross-reference validation happen before the server binds;
//! any failure aborts startup with a diagnostic and exit code 1.

pub mod validation;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::graph::GraphDefinition;

fn default_threads() -> usize {
    10
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_request_deadline_secs() -> u64 {
    60
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Listen port, shared by the v4 and v6 listeners.
    pub port: u16,

    /// IPv4 bind address; empty means unused unless `bind6` is also empty.
    #[serde(default)]
    pub bind4: String,

    /// IPv6 bind address; empty means unused.
    #[serde(default)]
    pub bind6: String,

    /// Worker thread count.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Accept requests that already passed through another router instance.
    #[serde(default)]
    pub allow_nested_requests: bool,

    /// Per-outgoing-call timeout in seconds.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Per-inbound-request deadline in seconds.
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,

    /// Host groups: group name to `host:port` entries.
    #[serde(default)]
    pub hosts: HashMap<String, Vec<String>>,

    /// Named dependency graphs.
    #[serde(default)]
    pub graphs: HashMap<String, GraphDefinition>,

    /// Path-prefix routes onto graphs.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// One route: path prefix `r` dispatches to graph `g`.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub r: String,
    pub g: String,
}

/// Errors raised while loading the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl RouterConfig {
    /// Load and parse the config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_config() {
        let json = r#"{
            "port": 8080,
            "bind4": "0.0.0.0",
            "threads": 4,
            "hosts": { "auth": ["10.0.0.1:9000"], "news": ["10.0.0.2:9000"] },
            "graphs": {
                "main": {
                    "services": [ "auth", "news" ],
                    "deps": [ { "a": "news", "b": "auth" } ]
                }
            },
            "routes": [ { "r": "/", "g": "main" } ]
        }"#;

        let config: RouterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind4, "0.0.0.0");
        assert_eq!(config.threads, 4);
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.graphs["main"].services.len(), 2);
        assert_eq!(config.routes[0].g, "main");
    }

    #[test]
    fn defaults_apply_when_keys_are_absent() {
        let config: RouterConfig = serde_json::from_str(r#"{ "port": 80 }"#).unwrap();
        assert_eq!(config.threads, 10);
        assert!(!config.allow_nested_requests);
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(30));
        assert_eq!(config.request_deadline(), Duration::from_secs(60));
        assert!(config.bind4.is_empty());
        assert!(config.bind6.is_empty());
        assert!(config.graphs.is_empty());
    }

    #[test]
    fn missing_port_is_a_parse_error() {
        let result = serde_json::from_str::<RouterConfig>(r#"{ "threads": 2 }"#);
        assert!(result.is_err());
    }
}
