//! Configuration module.
//!
//! Handles loading, validating, and merging the TOML configuration. Stock
//! defaults are the base layer; a user file overrides any subset of keys.
//!
//! ## Config File Location
//!
//! `--config <FILE>` names the file explicitly. Without it, `iiif-raster.toml`
//! in the working directory is used if present; otherwise stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [processing]
//! max_threads = 4              # Resampler worker threads (omit for auto = CPU cores)
//!
//! [scale]
//! downscale_filter = "box"     # Kernel when either axis shrinks
//! upscale_filter = "bicubic"   # Kernel otherwise
//! linear_output = false        # Tag output rasters as linear light
//! sharpen = 0.0                # Unsharp-mask amount after scaling (0 = off)
//! quality = 90                 # JPEG quality (1-100)
//!
//! [cache]
//! enabled = true
//! directory = ".iiif-cache"
//!
//! [log]
//! level = "info"               # trace, debug, info, warn, error, off
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Filter, FilterPolicy, Quality, Sharpen};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "iiif-raster.toml";

/// Largest accepted `scale.sharpen`.
pub const MAX_SHARPEN: f32 = 10.0;

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML encode error: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from TOML.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Worker pool settings.
    pub processing: ProcessingConfig,
    /// Kernel choice and post-processing for derivatives.
    pub scale: ScaleConfig,
    /// Derivative cache.
    pub cache: CacheConfig,
    /// Logging.
    pub log: LogConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.scale.quality) {
            return Err(ConfigError::Validation("scale.quality must be 1-100".into()));
        }
        if !self.scale.sharpen.is_finite() || !(0.0..=MAX_SHARPEN).contains(&self.scale.sharpen) {
            return Err(ConfigError::Validation(format!(
                "scale.sharpen must be between 0 and {MAX_SHARPEN}"
            )));
        }
        if self.cache.enabled && self.cache.directory.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "cache.directory must not be empty when the cache is enabled".into(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "log.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of resampler worker threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Derivative scaling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleConfig {
    pub downscale_filter: Filter,
    pub upscale_filter: Filter,
    pub linear_output: bool,
    pub sharpen: f32,
    pub quality: u32,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        let policy = FilterPolicy::default();
        Self {
            downscale_filter: policy.downscale,
            upscale_filter: policy.upscale,
            linear_output: false,
            sharpen: 0.0,
            quality: Quality::default().value(),
        }
    }
}

impl ScaleConfig {
    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            downscale: self.downscale_filter,
            upscale: self.upscale_filter,
        }
    }

    pub fn sharpen(&self) -> Sharpen {
        Sharpen(self.sharpen)
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.quality)
    }
}

/// Derivative cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".iiif-cache"),
        }
    }
}

/// Logging settings. `RUST_LOG` takes precedence when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration.
///
/// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] in the
/// working directory is used if present. User values are merged on top of
/// stock defaults, unknown keys are rejected, and the result is validated.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let overlay = match explicit {
        Some(path) => Some(toml::from_str(&fs::read_to_string(path)?)?),
        None => load_raw_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# iiif-raster Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Pass a file with --config, or place iiif-raster.toml in the working
# directory. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Resampler worker threads.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_threads = 4

# ---------------------------------------------------------------------------
# Scaling
# ---------------------------------------------------------------------------
[scale]
# Kernel used when either axis shrinks, unless --filter is given.
# One of: bell, bicubic, bicubic-high-freq, box, bspline, hermite,
# lanczos3, mitchell, triangle.
downscale_filter = "box"

# Kernel used when no axis shrinks.
upscale_filter = "bicubic"

# Tag output as linear light instead of gamma-encoded.
linear_output = false

# Unsharp-mask amount applied after scaling (0 = off, max 10).
sharpen = 0.0

# JPEG encoding quality (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Derivative cache
# ---------------------------------------------------------------------------
[cache]
# Reuse previously generated derivatives with the same source and options.
enabled = true

# Where cached derivatives and the manifest live.
directory = ".iiif-cache"

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[log]
# trace, debug, info, warn, error or off. RUST_LOG overrides this.
level = "info"
"##
}
