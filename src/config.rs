//! Configuration module for multichat.

use serde::Deserialize;
use std::path::Path;

use crate::{MultichatError, Result};

/// Placeholder substituted with the new user's name in the welcome message.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Room configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// Initial display name of the local operator.
    #[serde(default = "default_operator_name")]
    pub operator_name: String,
    /// Open a replacement session whenever a remote peer disconnects.
    #[serde(default)]
    pub auto_reconnect: bool,
    /// Whether operator input is parsed for commands.
    #[serde(default = "default_commands_enabled")]
    pub commands_enabled: bool,
    /// Leading character that marks a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: char,
    /// Welcome sent privately to each newly connected user.
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    /// Use random lowercase words instead of `User<n>` placeholder names.
    #[serde(default)]
    pub random_names: bool,
    /// Number of sessions opened right after start-up.
    #[serde(default)]
    pub initial_sessions: usize,
}

fn default_operator_name() -> String {
    "Admin".to_string()
}

fn default_commands_enabled() -> bool {
    true
}

fn default_command_prefix() -> char {
    '/'
}

fn default_welcome_message() -> String {
    "Welcome to the multi-chat room! Your name is {name}. Type \"/help\" for more information."
        .to_string()
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            operator_name: default_operator_name(),
            auto_reconnect: false,
            commands_enabled: default_commands_enabled(),
            command_prefix: default_command_prefix(),
            welcome_message: default_welcome_message(),
            random_names: false,
            initial_sessions: 0,
        }
    }
}

impl RoomConfig {
    /// Render the welcome message for a user.
    pub fn welcome_for(&self, name: &str) -> String {
        self.welcome_message.replace(NAME_PLACEHOLDER, name)
    }
}

/// Stranger lobby listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent stranger connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2424
}

fn default_max_connections() -> usize {
    20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/multichat.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Room configuration.
    #[serde(default)]
    pub room: RoomConfig,
    /// Lobby listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(MultichatError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| MultichatError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `MULTICHAT_OPERATOR_NAME`: Override the operator's display name
    /// - `MULTICHAT_AUTO_RECONNECT`: `true`/`false`/`1`/`0`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("MULTICHAT_OPERATOR_NAME") {
            if !name.trim().is_empty() {
                self.room.operator_name = name;
            }
        }

        if let Ok(value) = std::env::var("MULTICHAT_AUTO_RECONNECT") {
            match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.room.auto_reconnect = true,
                "0" | "false" | "no" | "off" => self.room.auto_reconnect = false,
                _ => {}
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.room.operator_name.trim().is_empty() {
            return Err(MultichatError::Config(
                "room.operator_name must not be empty".to_string(),
            ));
        }
        if self.room.command_prefix.is_whitespace() {
            return Err(MultichatError::Config(
                "room.command_prefix must not be whitespace".to_string(),
            ));
        }
        if !self.room.welcome_message.contains(NAME_PLACEHOLDER) {
            return Err(MultichatError::Config(format!(
                "room.welcome_message must contain {NAME_PLACEHOLDER}"
            )));
        }
        if self.server.max_connections == 0 {
            return Err(MultichatError::Config(
                "server.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
