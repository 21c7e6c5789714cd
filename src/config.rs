//! Client configuration
//!
//! Loaded from YAML, with the bearer token and an optional server URL
//! override taken from the environment (`.env` supported).

use chatlink::{ManagerConfig, Session};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable overriding `server.url`
pub const SERVER_URL_ENV: &str = "CHAT_SERVER_URL";

/// Environment variable holding the bearer token
pub const TOKEN_ENV: &str = "CHAT_TOKEN";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Chat client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Conversation that stdin lines are sent to
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bearer token from the environment (not in YAML)
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: default_open_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

fn default_conversation_id() -> String {
    "default".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_open_timeout_ms() -> u64 {
    20_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_probe_interval_secs() -> u64 {
    30
}

impl ClientConfig {
    /// Load configuration from YAML file and .env
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;

        // Don't fail if .env doesn't exist
        dotenv::dotenv().ok();

        config.apply_overrides(
            std::env::var(SERVER_URL_ENV).ok(),
            std::env::var(TOKEN_ENV).ok(),
        );

        config.validate()?;

        Ok(config)
    }

    /// Parse YAML without touching the environment
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply environment-provided values
    pub fn apply_overrides(&mut self, server_url: Option<String>, token: Option<String>) {
        if let Some(url) = server_url.filter(|u| !u.trim().is_empty()) {
            info!("Overriding server URL from environment variable");
            self.server.url = url;
        }

        self.token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let url = self.server.url.trim();
        let scheme_ok = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| url.starts_with(scheme));
        if !scheme_ok {
            return Err(ConfigError::ValidationError(format!(
                "server.url must start with http(s):// or ws(s)://, got '{}'",
                self.server.url
            )));
        }

        if self.connection.open_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connection.open_timeout_ms must be positive".to_string(),
            ));
        }

        if self.connection.probe_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "connection.probe_interval_secs must be positive".to_string(),
            ));
        }

        if self.conversation_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "conversation_id cannot be empty".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.log_level
            )));
        }

        Ok(())
    }

    /// Connection manager settings
    pub fn manager_config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::new(self.server.url.trim());
        config.open_timeout = Duration::from_millis(self.connection.open_timeout_ms);
        config.max_retries = self.connection.max_retries;
        config.base_delay = Duration::from_millis(self.connection.base_delay_ms);
        config.probe_interval = Duration::from_secs(self.connection.probe_interval_secs);
        config
    }

    /// Initial session: authenticated when a token is configured
    pub fn session(&self) -> Session {
        match &self.token {
            Some(token) => Session::authenticated(token.clone()),
            None => Session::anonymous(),
        }
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Server URL: {}", self.server.url);
        info!("  Conversation: {}", self.conversation_id);
        info!("  Open timeout: {}ms", self.connection.open_timeout_ms);
        info!(
            "  Reconnect: {} retries, base delay {}ms",
            self.connection.max_retries, self.connection.base_delay_ms
        );
        info!("  Latency probe: every {}s", self.connection.probe_interval_secs);
        info!("  Token: {}", if self.token.is_some() { "set" } else { "anonymous" });
        info!("  Log level: {}", self.log_level);
    }
}
