//! Configuration loading and resolution
//!
//! Every key resolves in priority order:
//! 1. Command line / environment (collected by the binary into [`ConfigOverrides`])
//! 2. TOML config file
//! 3. Compiled default

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 5780;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Coaches list performances created strictly after this instant
pub const DEFAULT_COACH_CUTOFF: &str = "2024-01-01T00:00:00Z";

/// Shortest accepted HMAC secret for connection tokens
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub database: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub coach_cutoff: Option<String>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    /// Parse a config file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load the config file, tolerating a missing file at the default location
    ///
    /// An explicitly requested path must exist. When no path is given the
    /// platform default is tried and a missing file yields empty settings.
    /// Nothing is logged here; this runs before the subscriber is installed,
    /// so the caller reports the returned [`ConfigSource`] afterwards.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            let file = Self::load(path)?;
            return Ok((file, ConfigSource::File(path.to_path_buf())));
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                let file = Self::load(&path)?;
                Ok((file, ConfigSource::File(path)))
            }
            Some(path) => Ok((Self::default(), ConfigSource::Missing(path))),
            None => Ok((Self::default(), ConfigSource::NoConfigDir)),
        }
    }
}

/// Where [`TomlConfig::load_or_default`] found its settings
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Default location checked, nothing there
    Missing(PathBuf),
    NoConfigDir,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "config file {}", path.display()),
            ConfigSource::Missing(path) => {
                write!(f, "defaults (no config file at {})", path.display())
            }
            ConfigSource::NoConfigDir => write!(f, "defaults (no config directory)"),
        }
    }
}

/// Values supplied on the command line or through `PTK_*` environment variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub database: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub coach_cutoff: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    pub database: PathBuf,
    pub jwt_secret: String,
    pub coach_cutoff: DateTime<Utc>,
    pub log_level: String,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("bind", &self.bind)
            .field("database", &self.database)
            .field("jwt_secret", &"<redacted>")
            .field("coach_cutoff", &self.coach_cutoff)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl ServerConfig {
    /// Merge overrides over file settings over compiled defaults
    pub fn resolve(overrides: ConfigOverrides, file: TomlConfig) -> Result<Self> {
        let jwt_secret = overrides
            .jwt_secret
            .or(file.jwt_secret)
            .ok_or_else(|| Error::Config("jwt_secret is required".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(Error::Config(format!(
                "jwt_secret must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }

        let cutoff = overrides
            .coach_cutoff
            .or(file.coach_cutoff)
            .unwrap_or_else(|| DEFAULT_COACH_CUTOFF.to_string());

        Ok(Self {
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            bind: overrides
                .bind
                .or(file.bind)
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            database: overrides
                .database
                .or(file.database)
                .unwrap_or_else(default_database_path),
            jwt_secret,
            coach_cutoff: parse_cutoff(&cutoff)?,
            log_level: overrides
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_cutoff(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Config(format!("Invalid coach_cutoff '{}': {}", value, e)))
}

/// `<config_dir>/ptk/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ptk").join("config.toml"))
}

/// `<data_local_dir>/ptk/ptk.db`, or `./ptk_data/ptk.db` where the platform has none
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ptk"))
        .unwrap_or_else(|| PathBuf::from("./ptk_data"))
        .join("ptk.db")
}
