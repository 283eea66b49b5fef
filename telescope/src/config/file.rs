//! Optional INI configuration file.
//!
//! ```ini
//! [cache]
//! directory = ~/Library/Caches/telescope
//! ttl_days = 5
//! memory_size = 256MB
//! format = png_if_transparent
//! quality = 0.7
//! coalesce = false
//!
//! [network]
//! timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::cache::CacheConfig;
use super::size::parse_size;
use crate::codec::{FormatPolicy, DEFAULT_JPEG_QUALITY};

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// A value is present but unusable.
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Loader for the INI configuration file.
pub struct ConfigFile;

impl ConfigFile {
    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<CacheConfig, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields [`CacheConfig::default`].
    pub fn load_from(path: &Path) -> Result<CacheConfig, ConfigFileError> {
        if !path.exists() {
            return Ok(CacheConfig::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Parse an INI document held in memory.
    pub fn parse_str(content: &str) -> Result<CacheConfig, ConfigFileError> {
        let ini = Ini::load_from_str(content).map_err(ini::Error::Parse)?;
        parse_ini(&ini)
    }
}

/// Overlay the values in `ini` onto [`CacheConfig::default`].
fn parse_ini(ini: &Ini) -> Result<CacheConfig, ConfigFileError> {
    let mut config = CacheConfig::default();

    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.root_dir = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("index_file") {
            let v = v.trim();
            if !v.is_empty() {
                config.index_file = Some(expand_tilde(v));
            }
        }
        if let Some(v) = section.get("ttl_days") {
            let days: f64 = v
                .trim()
                .parse()
                .map_err(|_| invalid("cache", "ttl_days", v, "must be a number of days"))?;
            if !days.is_finite() || days < 0.0 {
                return Err(invalid("cache", "ttl_days", v, "must be zero or positive"));
            }
            config.ttl = Duration::try_from_secs_f64(days * 24.0 * 60.0 * 60.0)
                .map_err(|_| invalid("cache", "ttl_days", v, "is too large"))?;
        }
        if let Some(v) = section.get("memory_size") {
            config.memory_capacity_bytes =
                parse_size(v).map_err(|e| invalid("cache", "memory_size", v, &e.to_string()))?;
        }

        let quality = match section.get("quality") {
            Some(v) => {
                let q: f32 = v
                    .trim()
                    .parse()
                    .map_err(|_| invalid("cache", "quality", v, "must be a number"))?;
                if !(0.0..=1.0).contains(&q) {
                    return Err(invalid("cache", "quality", v, "must be between 0.0 and 1.0"));
                }
                q
            }
            None => DEFAULT_JPEG_QUALITY,
        };
        match section.get("format") {
            Some(v) => {
                config.format_policy = FormatPolicy::from_name(v, quality).ok_or_else(|| {
                    invalid(
                        "cache",
                        "format",
                        v,
                        "must be one of: png, png_if_transparent, jpeg",
                    )
                })?;
            }
            None => config.format_policy = FormatPolicy::PngIfTransparent { quality },
        }

        if let Some(v) = section.get("coalesce") {
            config.coalesce_fetches = parse_bool(v)
                .ok_or_else(|| invalid("cache", "coalesce", v, "must be true or false"))?;
        }
        if let Some(v) = section.get("refresh_concurrency") {
            let n: usize = v
                .trim()
                .parse()
                .map_err(|_| invalid("cache", "refresh_concurrency", v, "must be a positive integer"))?;
            config.refresh_concurrency = n.max(1);
        }
    }

    if let Some(section) = ini.section(Some("network")) {
        if let Some(v) = section.get("timeout_secs") {
            let secs: u64 = v
                .trim()
                .parse()
                .map_err(|_| invalid("network", "timeout_secs", v, "must be whole seconds"))?;
            config.request_timeout = Duration::from_secs(secs);
        }
    }

    Ok(config)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

/// Default config file location (`<config dir>/telescope/config.ini`).
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("telescope")
        .join("config.ini")
}
