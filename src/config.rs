//! Configuration management for sql-fanout.
//!
//! Handles loading the TOML configuration file and defines the per-target
//! connection parameters stored in the registry.

use crate::db::DatabaseBackend;
use crate::error::{FanoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the platform config directory.
pub const APP_DIR: &str = "sql-fanout";

/// Main configuration structure for sql-fanout.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Target registry location.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Execution settings shared by all targets.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// CSV export settings.
    #[serde(default)]
    pub export: ExportConfig,
}

/// Target registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegistryConfig {
    /// Path of the registry file. Defaults to `servers.json` in the platform config directory.
    pub path: Option<PathBuf>,
}

/// Execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Upper bound on establishing a connection. Statements themselves never time out.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ExecutionConfig {
    /// Connection acquisition timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// CSV export configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Field delimiter (single ASCII character).
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
        }
    }
}

impl ExportConfig {
    /// Returns the delimiter as a byte, rejecting characters CSV cannot use.
    pub fn delimiter_byte(&self) -> Result<u8> {
        let d = self.delimiter;
        if !d.is_ascii() || d == '"' || d == '\r' || d == '\n' {
            return Err(FanoutError::config(format!(
                "Invalid export delimiter {d:?}. Expected a single ASCII character other than a quote or line break"
            )));
        }
        Ok(d as u8)
    }
}

/// How a target authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// User name and password.
    #[default]
    Sql,
    /// Operating system credentials of the current user.
    Integrated,
}

impl AuthMode {
    /// Parses an auth mode from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sql" | "password" => Some(Self::Sql),
            "integrated" | "windows" => Some(Self::Integrated),
            _ => None,
        }
    }
}

/// Connection parameters for one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Database backend.
    #[serde(default)]
    pub backend: DatabaseBackend,

    /// Server host. Unused for SQLite.
    #[serde(default)]
    pub host: String,

    /// Server port; the backend default when absent.
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name, or the database file path for SQLite.
    pub database: String,

    /// Login user.
    #[serde(default)]
    pub user: Option<String>,

    /// Login password. Only kept in memory; the registry decides how it is stored.
    #[serde(skip)]
    pub password: Option<String>,

    /// Authentication mode.
    #[serde(default)]
    pub auth: AuthMode,

    /// Accept any server certificate.
    #[serde(default = "default_trust_server_certificate")]
    pub trust_server_certificate: bool,
}

fn default_trust_server_certificate() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            host: String::new(),
            port: None,
            database: String::new(),
            user: None,
            password: None,
            auth: AuthMode::default(),
            trust_server_certificate: default_trust_server_certificate(),
        }
    }
}

impl ConnectionConfig {
    /// Effective port (explicit or backend default).
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.backend.default_port())
    }

    /// Host, or `localhost` when empty.
    pub fn effective_host(&self) -> &str {
        if self.host.is_empty() {
            "localhost"
        } else {
            &self.host
        }
    }

    /// Returns a display-safe string (no password) for UI purposes.
    pub fn display_string(&self) -> String {
        match self.backend {
            DatabaseBackend::Sqlite => format!("{} (sqlite)", self.database),
            _ => format!(
                "{} @ {}:{}",
                self.database,
                self.effective_host(),
                self.effective_port()
            ),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Returns the default registry path for the current platform.
    pub fn default_registry_path() -> PathBuf {
        config_dir().join("servers.json")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| FanoutError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            FanoutError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.export.delimiter_byte()?;
        Ok(config)
    }

    /// Registry path, preferring an explicit override.
    pub fn registry_path(&self, cli_override: Option<&Path>) -> PathBuf {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.registry.path.clone())
            .unwrap_or_else(Self::default_registry_path)
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
