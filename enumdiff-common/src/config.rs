//! Configuration file model and discovery
//!
//! Values are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! This module owns tier 3: the on-disk TOML model, where to find it, and how
//! to read and write it. Tiers 1 and 2 are handled by the binary's argument
//! parser; merging happens in `enumdiff_ai::config`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name used under the platform config directory
pub const CONFIG_DIR_NAME: &str = "enumdiff";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// On-disk TOML configuration
///
/// Every field is optional; absent values fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub service: ServiceSection,
    pub policy: PolicySection,
    pub run: RunSection,
    pub logging: LoggingConfig,
}

/// `[service]`: external analysis service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Chat-completions endpoint URL
    pub endpoint: Option<String>,
    /// API key (prefer the environment for secrets)
    pub api_key: Option<String>,
    /// Model name for the fast tier
    pub chat_model: Option<String>,
    /// Model name for the escalated tier
    pub reasoner_model: Option<String>,
    /// Client-side request rate limit
    pub requests_per_second: Option<u32>,
    /// Path to a prompt template overriding the built-in one
    pub prompt_template: Option<PathBuf>,
}

/// `[policy]`: escalation, clustering and decision thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub min_doc_count: Option<usize>,
    pub confidence_floor: Option<f64>,
    pub escalation_threshold: Option<f64>,
    pub similarity_threshold: Option<f64>,
    /// `token_sort`, `levenshtein` or `jaro_winkler`
    pub similarity_metric: Option<String>,
}

/// `[run]`: scheduling and output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// `chat`, `reasoner` or `auto`
    pub provider_mode: Option<String>,
    pub concurrency: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub max_retries: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Default config file location: `<config_dir>/enumdiff/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Locate and load the config file.
///
/// An explicitly given path must exist. Without one, the platform default is
/// tried and a missing file yields `Ok(None)`.
pub fn discover_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, TomlConfig)>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = load_toml_config(path)?;
        return Ok(Some((path.to_path_buf(), config)));
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            tracing::debug!(path = %path.display(), "Loaded default config file");
            Ok(Some((path, config)))
        }
        _ => Ok(None),
    }
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
