//! Runtime configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (EVALCACHE_CAPACITY, EVALCACHE_LOG)
//! 3. Config file (--config, or ~/.config/evalcache/config.toml)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use evalcache::util::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str("[eval_cache]\ncapacity = 16").unwrap();
//! assert_eq!(config.eval_cache.capacity, 16);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::runtime::eval::DEFAULT_CAPACITY;
use crate::runtime::gc::GCConfig;
use crate::util::logger::LogLevel;

/// Environment variable overriding `eval_cache.capacity`
pub const CAPACITY_ENV: &str = "EVALCACHE_CAPACITY";
/// Environment variable overriding `log.level`
pub const LOG_ENV: &str = "EVALCACHE_LOG";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Collector settings
    #[serde(default)]
    pub gc: GCConfig,
    /// Eval cache settings
    #[serde(default)]
    pub eval_cache: EvalCacheConfig,
    /// Log settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Eval cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCacheConfig {
    /// Entries per code block
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Drop every eval cache before a full collection
    #[serde(default = "default_clear_on_full_collection")]
    pub clear_on_full_collection: bool,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_clear_on_full_collection() -> bool {
    true
}

impl Default for EvalCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            clear_on_full_collection: true,
        }
    }
}

/// Log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl LogConfig {
    pub fn level(&self) -> Result<LogLevel, ConfigError> {
        self.level.parse().map_err(|_| ConfigError::InvalidValue {
            key: "log.level",
            value: self.level.clone(),
        })
    }
}

impl RuntimeConfig {
    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `EVALCACHE_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(CAPACITY_ENV) {
            self.eval_cache.capacity =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: CAPACITY_ENV,
                        value: value.clone(),
                    })?;
            debug!("{} overrides eval cache capacity", CAPACITY_ENV);
        }
        if let Some(value) = lookup(LOG_ENV) {
            self.log.level = value.trim().to_ascii_lowercase();
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log.level()?;
        if self.gc.collection_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "gc.collection_threshold",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("evalcache"));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("evalcache"));
    }

    // Windows
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("evalcache"));
    }

    None
}

/// Get the user config file path (~/.config/evalcache/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load configuration from `path`
/// Returns default config if file doesn't exist
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    if !path.exists() {
        debug!("no config at {}, using defaults", path.display());
        return Ok(RuntimeConfig::default());
    }

    let content = fs::read_to_string(path)?;
    RuntimeConfig::from_toml_str(&content)
}

/// Load the user-level config, or defaults when there is none
pub fn load_user_config() -> Result<RuntimeConfig, ConfigError> {
    match get_config_path() {
        Some(path) => load_config(&path),
        None => Ok(RuntimeConfig::default()),
    }
}

/// Save configuration to `path`, creating parent directories
pub fn save_config(
    config: &RuntimeConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    fs::write(path, config.to_toml_string()?)?;
    Ok(())
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests;
