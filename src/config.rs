//! Configuration for the mock server.
//!
//! Defines endpoint definitions, OpenAPI info, and server settings.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("endpoint {index} ({path}): {message}")]
    Invalid {
        index: usize,
        path: String,
        message: String,
    },
}

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StubberConfig {
    /// OpenAPI document info
    #[serde(default)]
    pub info: Option<ApiInfo>,

    /// Endpoint definitions, in registration order
    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,

    /// Server settings
    #[serde(default)]
    pub settings: ServerSettings,
}

impl StubberConfig {
    /// Load configuration from a JSON file, or YAML when the extension says so.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml" | "yml")
        );
        let config = if is_yaml {
            Self::from_yaml(&content)?
        } else {
            Self::from_json(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut wildcard_paths = HashSet::new();

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let invalid = |message: String| ConfigError::Invalid {
                index,
                path: endpoint.path.clone(),
                message,
            };

            endpoint.validate().map_err(invalid)?;

            if endpoint.is_wildcard() && !wildcard_paths.insert(endpoint.path.as_str()) {
                return Err(invalid(
                    "only one endpoint per path may omit the method".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Info block of the generated OpenAPI document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// A single endpoint definition.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDefinition {
    /// Route template, e.g. `/users/{id}`
    pub path: String,

    /// HTTP method (empty = any)
    #[serde(default)]
    pub method: String,

    /// Status code (0 = unset, answered as 200)
    #[serde(default)]
    pub status_code: u16,

    /// Static response body
    #[serde(default)]
    pub response: serde_json::Value,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Script computing the response
    #[serde(default)]
    pub script: Option<String>,

    /// Variables bound in the script's scope
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl EndpointDefinition {
    /// Whether this endpoint answers any method.
    pub fn is_wildcard(&self) -> bool {
        self.method.is_empty()
    }

    /// Whether this endpoint computes its response with a script.
    pub fn is_scripted(&self) -> bool {
        self.script.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// The configured status, with `0` resolved to 200.
    pub fn status(&self) -> Result<StatusCode, String> {
        match self.status_code {
            0 => Ok(StatusCode::OK),
            code => StatusCode::from_u16(code).map_err(|_| format!("invalid status code: {}", code)),
        }
    }

    /// Build the configured headers as an HTTP header map.
    pub fn header_map(&self) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name: {}", name))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header {}", name))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err("path must start with '/'".to_string());
        }
        self.status()?;
        self.header_map()?;
        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Operation budget per script evaluation (0 = unlimited)
    #[serde(default = "default_max_script_operations")]
    pub max_script_operations: u64,

    /// Idle script contexts kept for reuse
    #[serde(default = "default_max_idle_contexts")]
    pub max_idle_contexts: usize,

    /// Largest request body handed to scripts
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Log every matched endpoint
    #[serde(default = "default_true")]
    pub log_matches: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_script_operations: default_max_script_operations(),
            max_idle_contexts: default_max_idle_contexts(),
            max_body_bytes: default_max_body_bytes(),
            log_matches: true,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_script_operations() -> u64 {
    1_000_000
}

fn default_max_idle_contexts() -> usize {
    64
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}
