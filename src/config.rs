//! Configuration management for the realm registry
//!
//! Built-in defaults, overridden by an optional `config.toml`, overridden by
//! `REALM_REGISTRY_*` environment variables. Protocol timings are constants
//! and not configurable.

use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_REGISTRATION_PORT: u16 = 3444;
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

const ENV_PREFIX: &str = "REALM_REGISTRY";

/// Startup configuration; changes require a restart.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// IP address the registration listener binds to
    /// Environment: REALM_REGISTRY_BIND_ADDRESS
    pub bind_address: String,

    /// Environment: REALM_REGISTRY_REGISTRATION_PORT
    pub registration_port: u16,

    /// `host:port` of the local admin listener; disabled when unset
    /// Environment: REALM_REGISTRY_ADMIN_ADDRESS
    pub admin_address: Option<String>,

    /// Realm connections served at once; extra connections are refused
    /// Environment: REALM_REGISTRY_MAX_CONNECTIONS
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            registration_port: DEFAULT_REGISTRATION_PORT,
            admin_address: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl ServerConfig {
    /// Loads `./config.toml` (if present) with environment overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Loads from `path` (if present) with environment overrides.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .set_default("bind_address", DEFAULT_BIND_ADDRESS)?
            .set_default("registration_port", i64::from(DEFAULT_REGISTRATION_PORT))?
            .set_default("max_connections", DEFAULT_MAX_CONNECTIONS as i64)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.registration_port == 0 {
            return Err(config::ConfigError::Message(
                "registration_port cannot be 0".into(),
            ));
        }

        if self.bind_address.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "bind_address cannot be empty".into(),
            ));
        }

        if self.max_connections == 0 {
            return Err(config::ConfigError::Message(
                "max_connections must be greater than 0".into(),
            ));
        }

        if matches!(&self.admin_address, Some(addr) if addr.trim().is_empty()) {
            return Err(config::ConfigError::Message(
                "admin_address cannot be empty when set".into(),
            ));
        }

        Ok(())
    }

    /// Bind address and registration port as a socket address string
    pub fn registration_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.registration_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "realm-registry-{}-{}.toml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registration_socket(), "0.0.0.0:3444");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load_from("/nonexistent/realm-registry").unwrap();
        assert_eq!(config.registration_port, DEFAULT_REGISTRATION_PORT);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = temp_config(
            "override",
            "registration_port = 4555\nadmin_address = \"127.0.0.1:4556\"\n",
        );
        let config = ServerConfig::load_from(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.registration_port, 4555);
        assert_eq!(config.admin_address.as_deref(), Some("127.0.0.1:4556"));
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let path = temp_config("invalid", "max_connections = 0\n");
        assert!(ServerConfig::load_from(path.to_str().unwrap()).is_err());
        std::fs::remove_file(&path).ok();

        let config = ServerConfig {
            registration_port: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            bind_address: " ".into(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            admin_address: Some(String::new()),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
