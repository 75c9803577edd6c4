//! Application configuration loading, validation, and management.
//!
//! The top-level [`Config`] aggregates the logging, engine and transport
//! sections. It is loaded once at startup from a TOML file, patched with
//! environment overrides, validated, and treated as immutable afterwards.
//!
//! Lookup order for the file:
//! 1. `CLIMATECORE_CONFIG`
//! 2. `/etc/climatecore/config.toml`
//! 3. built-in defaults (a warning is printed)

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{engine::EngineConfig, logger::LoggerConfig};

pub mod engine;
pub mod logger;

pub const CONFIG_PATH_ENV: &str = "CLIMATECORE_CONFIG";
pub const SERVER_ENV: &str = "CLIMATECORE_NATS_SERVER";
pub const DEBUG_ENV: &str = "CLIMATECORE_DEBUG";
const DEFAULT_CONFIG_PATH: &str = "/etc/climatecore/config.toml";

#[doc(hidden)]
#[macro_export]
macro_rules! __print_line {
    ($level:expr, $($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default()
            ).dim(),
            $level,
            format_args!($($arg)*)
        );
    };
}

/// Timestamped console output for use before the tracing subscriber exists.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::__print_line!(console::style("INFO").green(), $($arg)*)
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::__print_line!(console::style("WARN").yellow(), $($arg)*)
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::__print_line!(console::style("ERROR").red(), $($arg)*)
    };
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    #[validate(nested)]
    pub engine: EngineConfig,

    #[validate(nested)]
    pub transport: climatecore_stream::Config,
}

impl Config {
    /// Locates, loads, overrides and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a configuration file exists but cannot be
    /// read, parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        let mut config = match Self::get_config_path()? {
            Some(path) => Self::parse_file(&path)?,
            None => {
                print_warn!("No configuration file found, using built-in defaults");
                Config::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(config)
    }

    /// Priority: `CLIMATECORE_CONFIG`, then `/etc/climatecore/config.toml`.
    ///
    /// A path named by the environment variable must exist.
    fn get_config_path() -> Result<Option<PathBuf>, ConfigError> {
        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(config_path);
            print_info!("Using config from {}: {}", CONFIG_PATH_ENV, path.display());
            if !path.exists() {
                return Err(ConfigError::Config(format!(
                    "{} points to a missing file: {}",
                    CONFIG_PATH_ENV,
                    path.display()
                )));
            }
            return Ok(Some(path));
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(Some(fallback.to_path_buf()));
        }

        Ok(None)
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// Environment overrides are not applied.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let config = Self::parse_file(path)?;
        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());
        let config_str = fs::read_to_string(path)?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Config, ConfigError> {
        toml::from_str(config_str).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Applies `CLIMATECORE_NATS_SERVER` and `CLIMATECORE_DEBUG`.
    ///
    /// `lookup` resolves a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server) = lookup(SERVER_ENV).filter(|s| !s.trim().is_empty()) {
            print_info!("Broker URL overridden by {}: {}", SERVER_ENV, server);
            self.transport.server = server.trim().to_string();
        }

        if lookup(DEBUG_ENV).is_some_and(|v| is_truthy(&v)) {
            self.logger.level = "debug".to_string();
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
