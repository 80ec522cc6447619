//! Configuration management for mapnotes.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::Zone;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "mapnotes";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "mapnotes.db";

/// Prefix of environment variables that override configuration.
const ENV_PREFIX: &str = "MAPNOTES_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `MAPNOTES_`, sections split on `__`)
/// 2. TOML config file at `~/.config/mapnotes/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Front-end config build configuration.
    pub frontend: FrontendConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Origins allowed by CORS. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/mapnotes/mapnotes.db`
    pub database_path: Option<PathBuf>,
    /// Sheet holding the records. Unset means the first sheet.
    pub sheet_name: Option<String>,
    /// Zone used for ids and timestamps: an IANA name such as `Asia/Taipei`
    /// or a fixed offset such as `+08:00`. Unset means the server's local zone.
    pub time_zone: Option<String>,
}

/// Front-end config build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Template holding default front-end settings.
    pub template_path: PathBuf,
    /// Where the generated front-end config is written.
    pub output_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("config.template.json"),
            output_path: PathBuf::from("config.json"),
        }
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        Self::from_figment(Self::figment(&config_file))
    }

    /// The provider stack used by [`Config::load_from`].
    #[must_use]
    pub fn figment(config_file: &std::path::Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate configuration from a figment.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if self.server.host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "server.host must not be empty".to_string(),
            });
        }

        if self.server.cors_origins.iter().any(|o| o.trim().is_empty()) {
            return Err(Error::ConfigValidation {
                message: "server.cors_origins must not contain empty origins".to_string(),
            });
        }

        if let Some(name) = &self.storage.sheet_name {
            if name.trim().is_empty() {
                return Err(Error::ConfigValidation {
                    message: "storage.sheet_name must not be empty when set".to_string(),
                });
            }
        }

        self.time_zone()?;
        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Parse the configured time zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither a `+HH:MM` offset nor a known
    /// IANA zone name.
    pub fn time_zone(&self) -> Result<Zone> {
        self.storage
            .time_zone
            .as_deref()
            .map_or(Ok(Zone::Local), str::parse::<Zone>)
    }

    /// Get the socket address string the server binds to.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
