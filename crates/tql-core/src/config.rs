//! TQL Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Graph store configuration
    pub graph: GraphConfig,

    /// CURIE prefix table (prefix -> IRI base)
    pub curies: BTreeMap<String, String>,

    /// Templated query endpoints
    pub endpoints: Vec<EndpointConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError { path, message },
            other => other,
        })
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `TQL_CONFIG` when set, then apply env overrides
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("TQL_CONFIG") {
            Ok(path) => Self::from_file(path)?.with_env_override(),
            Err(_) => Self::from_env(),
        }
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "API_PORT".to_string(),
                value: port,
            })?;
        }

        if let Ok(path) = std::env::var("TQL_GRAPH_FIXTURE") {
            self.graph.fixture_path = Some(PathBuf::from(path));
        }
        if let Ok(policy) = std::env::var("TQL_ENTAILMENT") {
            self.graph.entailment = policy.parse()?;
        }
        if let Ok(budget) = std::env::var("TQL_TRAVERSAL_BUDGET") {
            self.graph.traversal_budget =
                budget.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "TQL_TRAVERSAL_BUDGET".to_string(),
                    value: budget,
                })?;
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Reject endpoint tables that cannot be routed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            let path = endpoint.path.trim_matches('/');
            if path.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "endpoints.path".to_string(),
                    value: endpoint.path.clone(),
                });
            }
            if endpoint.query.trim().is_empty() {
                return Err(ConfigError::MissingRequired(format!(
                    "endpoints[{}].query",
                    endpoint.path
                )));
            }
            if !seen.insert(path) {
                return Err(ConfigError::InvalidValue {
                    key: "endpoints.path (duplicate)".to_string(),
                    value: endpoint.path.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_enabled: true,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Graph store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// JSON fixture loaded into the in-memory graph at startup
    pub fixture_path: Option<PathBuf>,

    /// Relationship type that declares one relationship type a sub-type of another
    pub subsumption_type: String,

    /// Node property holding the short name of a relationship type node
    pub fragment_property: String,

    /// How far `!` expansion walks the subsumption hierarchy
    pub entailment: EntailmentPolicy,

    /// Relationship traversals one query may perform before it fails
    pub traversal_budget: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            fixture_path: None,
            subsumption_type: "subPropertyOf".to_string(),
            fragment_property: "fragment".to_string(),
            entailment: EntailmentPolicy::DirectSubtypes,
            traversal_budget: 100_000,
        }
    }
}

/// Depth of relationship entailment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntailmentPolicy {
    /// One hop: the requested types plus their declared direct sub-types
    #[default]
    DirectSubtypes,
    /// Repeat the one-hop expansion until no new types appear
    Transitive,
}

impl std::str::FromStr for EntailmentPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" | "direct_subtypes" => Ok(Self::DirectSubtypes),
            "transitive" => Ok(Self::Transitive),
            _ => Err(ConfigError::InvalidValue {
                key: "TQL_ENTAILMENT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// A templated query exposed as an HTTP endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Route below `/api/v1/dynamic/`, may contain `:name` captures
    pub path: String,

    /// Query template
    pub query: String,

    /// One-line summary shown in the endpoint listing
    #[serde(default)]
    pub summary: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.graph.subsumption_type, "subPropertyOf");
        assert_eq!(config.graph.entailment, EntailmentPolicy::DirectSubtypes);
        assert_eq!(config.graph.traversal_budget, 100_000);
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn test_entailment_policy_parse() {
        assert_eq!(
            "transitive".parse::<EntailmentPolicy>().unwrap(),
            EntailmentPolicy::Transitive
        );
        assert_eq!(
            "DIRECT".parse::<EntailmentPolicy>().unwrap(),
            EntailmentPolicy::DirectSubtypes
        );
        assert!("deep".parse::<EntailmentPolicy>().is_err());
    }

    #[test]
    fn test_toml_endpoints_and_curies() {
        let config = AppConfig::from_toml_str(
            r#"
            [curies]
            X = "http://x.org/#"

            [graph]
            entailment = "transitive"

            [[endpoints]]
            path = "related/:id"
            query = "MATCH (n {fragment: '${id}'})-[r]-(m) RETURN n, r, m"
            summary = "Neighbours of a node"
            "#,
        )
        .unwrap();

        assert_eq!(config.curies.get("X").map(String::as_str), Some("http://x.org/#"));
        assert_eq!(config.graph.entailment, EntailmentPolicy::Transitive);
        assert_eq!(config.graph.fragment_property, "fragment");
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].path, "related/:id");
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let result = AppConfig::from_toml_str(
            r#"
            [[endpoints]]
            path = "a"
            query = "MATCH (n) RETURN n"

            [[endpoints]]
            path = "/a/"
            query = "MATCH (n) RETURN n"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_empty_query_rejected() {
        let result = AppConfig::from_toml_str(
            r#"
            [[endpoints]]
            path = "a"
            query = "  "
            "#,
        );
        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));
    }
}
