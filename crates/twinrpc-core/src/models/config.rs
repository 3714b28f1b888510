//! Client and server configuration

use crate::{Error, Protocol, Result};
use serde::{Deserialize, Serialize};

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// HTTP path the endpoint is mounted on
    pub path: String,
    pub protocol: Protocol,
    /// Attach the offending request to error responses
    pub expose_error_source: bool,
    /// Invoke batch units concurrently
    pub parallel_batch: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    pub protocol: Protocol,
    pub timeout_ms: u64,
    /// Scope recorded for calls that do not name one
    pub default_scope: String,
    /// Allow the non-standard `<batch>` wrapper for XML-RPC
    pub xml_batch: bool,
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(Error::Validation("Bind address cannot be empty".to_string()));
        }

        if !self.path.starts_with('/') {
            return Err(Error::Validation(format!(
                "Endpoint path '{}' must start with '/'",
                self.path
            )));
        }

        if self.path == "/health" {
            return Err(Error::Validation(
                "Endpoint path '/health' is reserved".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            path: "/rpc".to_string(),
            protocol: Protocol::JsonRpc,
            expose_error_source: false,
            parallel_batch: true,
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Validation("Server URL cannot be empty".to_string()));
        }

        if self.timeout_ms == 0 {
            return Err(Error::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.default_scope.trim().is_empty() {
            return Err(Error::Validation(
                "Default scope cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/rpc".to_string(),
            protocol: Protocol::JsonRpc,
            timeout_ms: 30_000,
            default_scope: "default".to_string(),
            xml_batch: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_server_config_validation() {
        let mut config = ServerConfig::default();

        config.path = "rpc".to_string();
        assert!(config.validate().is_err());

        config.path = "/rpc".to_string();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        config.log_level = "debug".to_string();
        config.bind_addr = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_config_validation() {
        let config = ClientConfig {
            timeout_ms: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            url: String::new(),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"protocol": "xml-rpc", "expose_error_source": true}"#)
                .unwrap();
        assert_eq!(config.protocol, Protocol::XmlRpc);
        assert!(config.expose_error_source);
        assert_eq!(config.path, "/rpc");
    }
}
