//! Shell configuration
//!
//! Loaded from a TOML file. Every section is optional and falls back to the
//! defaults the shell uses without a file. Credentials are never stored in
//! the file itself, only the names of the environment variables holding them.

use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "mqttsh.toml";

const SUPPORTED_NETWORKS: [&str; 3] = ["tcp", "tcp4", "tcp6"];

/// Main shell configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShellConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub output: OutputSection,
}

/// Where `conn` dials when no flag says otherwise
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_address")]
    pub address: String,
    /// Seconds to wait for CONNACK (default: 30)
    pub connack_timeout_secs: Option<u64>,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            network: default_network(),
            address: default_address(),
            connack_timeout_secs: None,
        }
    }
}

fn default_network() -> String {
    "tcp".to_string()
}

fn default_address() -> String {
    "localhost:1883".to_string()
}

/// CONNECT defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Fixed client identifier; a random one is generated when absent
    pub client_id: Option<String>,
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Keep-alive in seconds, 0 disables pings (default: 60)
    pub keep_alive_secs: Option<u16>,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            client_id: None,
            clean_session: default_clean_session(),
            keep_alive_secs: None,
            username_env: None,
            password_env: None,
        }
    }
}

fn default_clean_session() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputSection {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ShellConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ShellConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else [`DEFAULT_CONFIG_FILE`] if it exists, else
    /// defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load_from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.address.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.address must not be empty".to_string(),
            ));
        }
        if !SUPPORTED_NETWORKS.contains(&self.broker.network.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "broker.network '{}' must be one of {}",
                self.broker.network,
                SUPPORTED_NETWORKS.join(", ")
            )));
        }
        if let Some(client_id) = &self.session.client_id {
            if client_id.len() > usize::from(u16::MAX) {
                return Err(ConfigError::InvalidConfig(
                    "session.client_id is too long".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.session.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.session.password_env.as_ref())
    }

    /// Like [`ShellConfig::get_mqtt_password`], but a configured variable
    /// that is unset is an error
    pub fn require_mqtt_password(&self) -> Result<Option<String>, ConfigError> {
        self.session
            .password_env
            .as_deref()
            .map(Self::get_env_var_required)
            .transpose()
    }
}
