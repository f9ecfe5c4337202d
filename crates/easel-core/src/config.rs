//! Typed configuration with file/environment layering.
//!
//! Compiled-in defaults come first; `config/default.toml` and
//! `config/local.toml` override them when present, and `EASEL_*` environment
//! variables win over both (section separator `__`, e.g.
//! `EASEL_CANVAS__EDIT_TIMEOUT_MINUTES=15`). Loaded once at startup;
//! components receive owned copies of their sections.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Application-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Environment name ("development", "production")
    pub env: String,
    /// Default log filter directive when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/easel.db"),
        }
    }
}

/// Canvas editing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Minutes of inactivity before an edit session expires
    pub edit_timeout_minutes: i64,
    /// Seconds between automatic draft saves
    pub auto_save_interval_seconds: u64,
    /// Maximum canvas content length, in characters
    pub max_content_length: usize,
    /// Characters of content shown in canvas previews
    pub content_preview_length: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            edit_timeout_minutes: 10,
            auto_save_interval_seconds: 30,
            max_content_length: 10_000,
            content_preview_length: 200,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application-level settings
    pub app: AppSettings,
    /// Storage backend settings
    pub database: DatabaseConfig,
    /// Canvas editing settings
    pub canvas: CanvasConfig,
}

impl AppConfig {
    /// Check numeric bounds. Every duration and length must be positive.
    pub fn validate(&self) -> Result<()> {
        if self.canvas.edit_timeout_minutes <= 0 {
            return Err(Error::invalid_config(
                "canvas.edit_timeout_minutes",
                "must be positive",
            ));
        }
        if self.canvas.auto_save_interval_seconds == 0 {
            return Err(Error::invalid_config(
                "canvas.auto_save_interval_seconds",
                "must be positive",
            ));
        }
        if self.canvas.max_content_length == 0 {
            return Err(Error::invalid_config(
                "canvas.max_content_length",
                "must be positive",
            ));
        }
        if self.canvas.content_preview_length == 0 {
            return Err(Error::invalid_config(
                "canvas.content_preview_length",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Load configuration from defaults, optional files, and environment.
pub fn load_config() -> Result<AppConfig> {
    let defaults = ::config::Config::try_from(&AppConfig::default())
        .map_err(|e| Error::Configuration(e.to_string()))?;

    let layered = ::config::Config::builder()
        // 1. Compiled-in defaults (always available)
        .add_source(defaults)
        // 2. External overrides (optional)
        .add_source(::config::File::with_name("config/default").required(false))
        .add_source(::config::File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority)
        .add_source(
            ::config::Environment::with_prefix("EASEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| Error::Configuration(e.to_string()))?;

    let config: AppConfig = layered
        .try_deserialize()
        .map_err(|e| Error::Configuration(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.canvas.edit_timeout_minutes, 10);
        assert_eq!(config.canvas.auto_save_interval_seconds, 30);
        assert_eq!(config.canvas.max_content_length, 10_000);
    }

    #[test]
    fn test_rejects_non_positive_timeout() {
        let mut config = AppConfig::default();
        config.canvas.edit_timeout_minutes = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("edit_timeout_minutes"));
    }

    #[test]
    fn test_rejects_zero_autosave_interval() {
        let mut config = AppConfig::default();
        config.canvas.auto_save_interval_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auto_save_interval_seconds"));
    }

    #[test]
    fn test_rejects_zero_content_length() {
        let mut config = AppConfig::default();
        config.canvas.max_content_length = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_content_length"));
    }
}
