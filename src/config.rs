use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::backend::BackendKind;
use crate::core::namespace::{KeyCase, KeyNamespace};

/// Top-level configuration: named stores, each binding one adapter to one
/// endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub stores: HashMap<String, StoreConfig>,
}

/// Wire protocol selection for the memcache-family adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    Ascii,
    Binary,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Adapter name: memcache, memcached or redis (case-insensitive).
    pub adapter: String,
    pub host: String,
    pub port: u16,
    /// Connect-time timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Accepted for configuration compatibility; both client libraries hold
    /// persistent connections regardless.
    #[serde(default)]
    pub persistent: bool,
    /// Memcache-family wire protocol override.
    #[serde(default)]
    pub protocol: Option<WireProtocol>,
    /// Compress payloads on adapters that offer it.
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub key_case: KeyCase,
    #[serde(default)]
    pub namespace: KeyNamespace,
    /// Non-empty list restricts which key names the adapter accepts.
    #[serde(default)]
    pub allowed_keys: Vec<String>,
    /// When set, append indexes come from an auxiliary counter stored at
    /// `<composed key><suffix>` instead of sequential insertion order.
    #[serde(default)]
    pub append_counter_suffix: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from a YAML file.
    pub async fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML string (useful for testing).
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for common errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, store) in &self.stores {
            store
                .validate()
                .map_err(|e| match e {
                    ConfigError::ValidationError(msg) => {
                        ConfigError::ValidationError(format!("store '{}': {}", name, msg))
                    }
                    other => other,
                })?;
        }
        Ok(())
    }

    pub fn store(&self, name: &str) -> Result<&StoreConfig, ConfigError> {
        self.stores
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStore(name.to_string()))
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if BackendKind::parse(&self.adapter).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "unknown adapter '{}'",
                self.adapter
            )));
        }
        if self.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "host must be specified".to_string(),
            ));
        }
        Ok(())
    }

    pub fn kind(&self) -> Result<BackendKind, ConfigError> {
        BackendKind::parse(&self.adapter)
            .map_err(|_| ConfigError::ValidationError(format!("unknown adapter '{}'", self.adapter)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("No store named '{0}' in configuration")]
    UnknownStore(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_store_config() {
        let yaml = r#"
stores:
  sessions:
    adapter: "memcached"
    host: "127.0.0.1"
    port: 11211
    timeout: 3
    compress: true
    key_case: lower
    protocol: binary
    namespace:
      prefix: ["app", "prod"]
      prefix_delimiter: ":"
      suffix: ["v2"]
    allowed_keys: ["cart", "session"]
    append_counter_suffix: "Count"
  counters:
    adapter: "redis"
    host: "127.0.0.1"
    port: 6379
"#;

        let config = Config::from_yaml_str(yaml).expect("Failed to parse config");
        assert_eq!(config.stores.len(), 2);

        let sessions = config.store("sessions").unwrap();
        assert_eq!(sessions.kind().unwrap(), BackendKind::Memcached);
        assert_eq!(sessions.timeout, 3);
        assert_eq!(sessions.protocol, Some(WireProtocol::Binary));
        assert!(sessions.compress);
        assert_eq!(sessions.key_case, KeyCase::Lower);
        assert_eq!(sessions.namespace.prefix, vec!["app", "prod"]);
        assert_eq!(sessions.namespace.prefix_delimiter, ":");
        assert_eq!(sessions.namespace.suffix_delimiter, "-");
        assert_eq!(sessions.append_counter_suffix.as_deref(), Some("Count"));

        let counters = config.store("counters").unwrap();
        assert_eq!(counters.timeout, 10);
        assert!(!counters.compress);
        assert!(counters.allowed_keys.is_empty());
        assert_eq!(counters.key_case, KeyCase::Preserve);
    }

    #[test]
    fn test_unknown_adapter_rejected() {
        let yaml = r#"
stores:
  bad:
    adapter: "kyototycoon"
    host: "127.0.0.1"
    port: 1978
"#;

        let result = Config::from_yaml_str(yaml);
        match result {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("unknown adapter 'kyototycoon'"));
                assert!(msg.contains("store 'bad'"));
            }
            other => panic!("Expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_host_rejected() {
        let yaml = r#"
stores:
  bad:
    adapter: "redis"
    host: ""
    port: 6379
"#;

        let result = Config::from_yaml_str(yaml);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_out_of_range_port_is_a_parse_error() {
        let yaml = r#"
stores:
  bad:
    adapter: "redis"
    host: "127.0.0.1"
    port: 70000
"#;

        let result = Config::from_yaml_str(yaml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_store_lookup() {
        let yaml = r#"
stores:
  main:
    adapter: "memcache"
    host: "127.0.0.1"
    port: 11211
"#;

        let config = Config::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            config.store("missing"),
            Err(ConfigError::UnknownStore(_))
        ));
    }
}
