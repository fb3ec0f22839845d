//! Config file parsing for `~/.config/ebook-export/config.toml`.
//!
//! Use `export_options_from_config` and `history_store_from_config` so the
//! configured defaults and limits apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::export::ExportOptions;
use crate::history::{HistoryStore, DEFAULT_MAX_ENTRIES};
use crate::model::TypographyPreset;
use crate::security::SecurityLimits;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_typography")]
    pub typography: String,
    /// Deflate level 0-9 for archive members other than `mimetype`.
    pub compression_level: Option<i64>,
}

fn default_language() -> String {
    "en".to_string()
}
fn default_typography() -> String {
    "default".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            typography: default_typography(),
            compression_level: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub dir: Option<String>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_nesting_depth: Option<u32>,
    pub max_chapter_size_mb: Option<u64>,
    pub max_image_size_mb: Option<u64>,
}

/// Load config from the default path. Missing file means defaults.
pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    }
}

/// Load config from `path`. A malformed file falls back to defaults.
pub fn load_config_from(path: &Path) -> AppConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not read config {}: {}", path.display(), e);
            }
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("ebook-export");
        p.push("config.toml");
        p
    })
}

/// Build security limits from config. Uses defaults for any unset values.
pub fn security_limits_from_config(c: &SecurityConfig) -> SecurityLimits {
    let mut limits = SecurityLimits::default();
    if let Some(depth) = c.max_nesting_depth {
        limits.max_nesting_depth = depth;
    }
    if let Some(mb) = c.max_chapter_size_mb {
        let bytes = mb.saturating_mul(1024).saturating_mul(1024);
        limits.max_chapter_size_bytes = usize::try_from(bytes).unwrap_or(usize::MAX);
    }
    if let Some(mb) = c.max_image_size_mb {
        limits.max_resource_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    limits
}

pub fn export_options_from_config(cfg: &AppConfig) -> ExportOptions {
    ExportOptions {
        default_language: cfg.export.default_language.clone(),
        typography: TypographyPreset::from_name(&cfg.export.typography),
        limits: security_limits_from_config(&cfg.security),
        compression_level: cfg.export.compression_level,
        ..ExportOptions::default()
    }
}

/// `None` when no directory is configured and the platform has no data dir.
pub fn history_store_from_config(cfg: &HistoryConfig) -> Option<HistoryStore> {
    let root = match &cfg.dir {
        Some(d) => PathBuf::from(d),
        None => HistoryStore::default_root()?,
    };
    Some(HistoryStore::new(root, cfg.max_entries))
}

/// Apply `section.key = value` to `cfg`.
pub fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["export", sub] => match *sub {
            "default_language" => cfg.export.default_language = value.to_string(),
            "typography" => {
                if !TypographyPreset::ALL.iter().any(|p| p.name() == value) {
                    return Err(invalid());
                }
                cfg.export.typography = value.to_string();
            }
            "compression_level" => {
                let level: i64 = value.parse().map_err(|_| invalid())?;
                if !(0..=9).contains(&level) {
                    return Err(invalid());
                }
                cfg.export.compression_level = Some(level);
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        ["history", sub] => match *sub {
            "dir" => cfg.history.dir = Some(value.to_string()),
            "max_entries" => cfg.history.max_entries = value.parse().map_err(|_| invalid())?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        ["security", sub] => match *sub {
            "max_nesting_depth" => cfg.security.max_nesting_depth = Some(value.parse().map_err(|_| invalid())?),
            "max_chapter_size_mb" => cfg.security.max_chapter_size_mb = Some(value.parse().map_err(|_| invalid())?),
            "max_image_size_mb" => cfg.security.max_image_size_mb = Some(value.parse().map_err(|_| invalid())?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}
