//! Configuration layer: typed settings with layered precedence (file → env).
//!
//! The embedding process decides where the file lives; everything can also
//! be supplied through `OMBRA_`-prefixed environment variables, e.g.
//! `OMBRA_CACHE__DEFAULT_TTL_SECS=900`.
//!
//! Configuration errors are fatal here, at startup, and nowhere else: once
//! a [`Settings`] value exists it is immutable and every later fallback
//! (unknown category, missing override) resolves to a default instead of
//! an error.

use std::{collections::HashMap, path::PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const ENV_PREFIX: &str = "OMBRA";
const DEFAULT_CONFIG_BASENAME: &str = "ombra";
const DEFAULT_DB_PATH: &str = "ombra_cache.db";

/// One hour, matching the volatility of the bulk of governance data.
pub const DEFAULT_TTL_SECS: u64 = 3600;
/// Sweep cadence defaults to the default TTL.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = DEFAULT_TTL_SECS;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level settings for the cache subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub sweep: SweepSettings,
    pub logging: LoggingSettings,
}

/// Cache store and TTL policy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Disabling degrades every lookup to a miss without touching disk.
    pub enabled: bool,
    /// Location of the embedded store file.
    pub db_path: PathBuf,
    /// TTL applied to categories with no more specific match.
    pub default_ttl_secs: u64,
    /// Category substring → TTL seconds; `0` means never cache.
    pub ttl_overrides: HashMap<String, u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            default_ttl_secs: DEFAULT_TTL_SECS,
            ttl_overrides: HashMap::new(),
        }
    }
}

/// Background eviction sweep settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// Disabling the sweep is supported; the store then grows until
    /// explicitly invalidated.
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default tracing directive, e.g. `info` or `ombra=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingSettings {
    pub fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }
}

impl Settings {
    /// Load settings from an optional TOML file and the environment.
    ///
    /// With no explicit path, `ombra.toml` in the working directory is used
    /// when present. Environment variables override file values.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false)),
        };
        let settings: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.cache.default_ttl_secs == 0 {
            return Err(SettingsError::Invalid(
                "cache.default_ttl_secs must be positive; disable the cache instead".to_string(),
            ));
        }
        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "sweep.interval_secs must be positive when the sweep is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
