//! Config file parsing for `~/.config/epub-shelf/config.toml`.
//!
//! Use `import_options_from_config` to build import options from the loaded
//! config so security and TOC settings apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::navigation::TocOptions;
use crate::parser::ImportOptions;
use crate::security::SecurityLimits;

const APP_DIR: &str = "epub-shelf";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub toc: TocConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where book records live. Defaults to `<data_local_dir>/epub-shelf/library`.
    pub library_dir: Option<String>,
    /// Where extracted covers go. Defaults to `<data_local_dir>/epub-shelf/covers`.
    pub covers_dir: Option<String>,
}

impl StorageConfig {
    pub fn library_dir(&self) -> PathBuf {
        self.library_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("library"))
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.covers_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("covers"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TocConfig {
    #[serde(default)]
    pub include_nested: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_file_size_mb: Option<u64>,
    pub max_compression_ratio: Option<u64>,
    pub max_file_count: Option<u64>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push(APP_DIR);
        p.push("config.toml");
        p
    })
}

/// Load config from the default path. A missing or unreadable file gives the
/// defaults.
pub fn load_config() -> AppConfig {
    let Some(path) = config_path() else {
        return AppConfig::default();
    };
    if !path.exists() {
        return AppConfig::default();
    }
    match load_config_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Ignoring config: {}", e);
            AppConfig::default()
        }
    }
}

/// Load config from an explicit path, reporting every problem.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str::<AppConfig>(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}

pub fn save_config(cfg: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(cfg).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Set one dotted key (`section.field`) from a string value.
pub fn set_value(cfg: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    let number = || value.parse::<u64>().map_err(|_| invalid());

    match key {
        "storage.library_dir" => cfg.storage.library_dir = Some(value.to_string()),
        "storage.covers_dir" => cfg.storage.covers_dir = Some(value.to_string()),
        "toc.include_nested" => cfg.toc.include_nested = value.parse().map_err(|_| invalid())?,
        "security.max_file_size_mb" => cfg.security.max_file_size_mb = Some(number()?),
        "security.max_compression_ratio" => cfg.security.max_compression_ratio = Some(number()?),
        "security.max_file_count" => cfg.security.max_file_count = Some(number()?),
        other => return Err(ConfigError::UnknownKey(other.to_string())),
    }
    Ok(())
}

/// Build security limits from config. Uses defaults for any unset values.
pub fn security_limits_from_config(c: &SecurityConfig) -> SecurityLimits {
    let mut limits = SecurityLimits::default();
    if let Some(mb) = c.max_file_size_mb {
        limits.max_total_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    if let Some(r) = c.max_compression_ratio {
        limits.max_compression_ratio = r;
    }
    if let Some(n) = c.max_file_count {
        limits.max_file_count = n;
    }
    limits
}

pub fn import_options_from_config(cfg: &AppConfig) -> ImportOptions {
    ImportOptions {
        security: security_limits_from_config(&cfg.security),
        toc: TocOptions {
            include_nested: cfg.toc.include_nested,
        },
        extract_cover: true,
    }
}
