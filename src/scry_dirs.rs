//! Centralized directory paths for scry.
//!
//! Uses the [`dirs`] crate for platform-appropriate locations.
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/scry/` | `~/.local/share/scry/` |
//! | Config | `~/Library/Application Support/scry/` | `~/.config/scry/` |
//! | Cache | `~/Library/Caches/scry/` | `~/.cache/scry/` |
//!
//! # Environment Overrides
//!
//! - `SCRY_DATA_DIR` overrides [`data_dir`]
//! - `SCRY_CONFIG_DIR` overrides [`config_dir`]
//! - `SCRY_CACHE_DIR` overrides [`cache_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/scry/` by default. Override with
/// the `SCRY_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SCRY_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("scry"))
        .unwrap_or_else(|| PathBuf::from("/tmp/scry-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/scry/` by default. Override with
/// the `SCRY_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SCRY_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("scry"))
        .unwrap_or_else(|| PathBuf::from("/tmp/scry-config"))
}

/// Application cache directory.
///
/// Resolves to `dirs::cache_dir()/scry/` by default. Override with
/// the `SCRY_CACHE_DIR` environment variable.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SCRY_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::cache_dir()
        .map(|d| d.join("scry"))
        .unwrap_or_else(|| PathBuf::from("/tmp/scry-cache"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Link preview cache root (`cache_dir()/link_preview/`).
///
/// Fetched API payloads, media and rendered previews live here, keyed by
/// site and post id.
#[must_use]
pub fn preview_cache_dir() -> PathBuf {
    cache_dir().join("link_preview")
}

/// Scratch directory for per-request thumbnails (`cache_dir()/tmp/`).
#[must_use]
pub fn scratch_dir() -> PathBuf {
    cache_dir().join("tmp")
}
