//! Configuration types for image search, link preview and rendering.
//!
//! The file is TOML; every section falls back to defaults so a missing or
//! partial file is valid. Requests read the file through [`ConfigSource`]
//! so live edits apply to the next request without a restart.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ScryError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScryConfig {
    /// Image search engines and merge defaults.
    pub image_search: ImageSearchConfig,
    /// Link preview credentials and cache policy.
    pub link_preview: LinkPreviewConfig,
    /// Rendering service settings.
    pub render: RenderConfig,
    /// Shared HTTP client settings.
    pub http: HttpConfig,
}

/// Image search defaults and per-engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSearchConfig {
    /// Minimum similarity applied when a request names none.
    pub default_similarity: f64,
    /// Maximum result count applied when a request names none.
    pub default_count: usize,
    /// Engine used when a request names none; `"all"` queries every enabled engine.
    pub default_engine: String,
    /// SauceNAO settings.
    pub saucenao: SauceNaoConfig,
    /// IQDB settings.
    pub iqdb: IqdbConfig,
    /// trace.moe settings.
    pub tracemoe: TraceMoeConfig,
    /// Fluffle settings.
    pub fluffle: FluffleConfig,
}

impl Default for ImageSearchConfig {
    fn default() -> Self {
        Self {
            default_similarity: -9999.0,
            default_count: 30,
            default_engine: "all".to_owned(),
            saucenao: SauceNaoConfig::default(),
            iqdb: IqdbConfig::default(),
            tracemoe: TraceMoeConfig::default(),
            fluffle: FluffleConfig::default(),
        }
    }
}

/// SauceNAO engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SauceNaoConfig {
    /// Whether the engine takes part in searches.
    pub enabled: bool,
    /// Result pages to process.
    pub max_page: usize,
    /// Search endpoint.
    pub endpoint: String,
    /// API key; empty uses the anonymous quota.
    pub api_key: String,
    /// Server-side minimum similarity (percent).
    pub min_sim: u32,
    /// Explicit-content hiding level (0 = show all, 3 = hide all suspect).
    pub hide: u8,
}

impl Default for SauceNaoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_page: 1,
            endpoint: "https://saucenao.com/search.php".to_owned(),
            api_key: String::new(),
            min_sim: 75,
            hide: 2,
        }
    }
}

/// IQDB engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IqdbConfig {
    /// Whether the engine takes part in searches.
    pub enabled: bool,
    /// Result pages to process.
    pub max_page: usize,
    /// Endpoint for 2D (anime/illustration) search.
    pub endpoint: String,
    /// Endpoint for 3D (photo) search.
    pub endpoint_3d: String,
    /// Search the 3D index instead of the 2D one.
    pub is_3d: bool,
}

impl Default for IqdbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_page: 1,
            endpoint: "https://iqdb.org/".to_owned(),
            endpoint_3d: "https://3d.iqdb.org/".to_owned(),
            is_3d: false,
        }
    }
}

impl IqdbConfig {
    /// Endpoint for the configured index.
    pub fn active_endpoint(&self) -> &str {
        if self.is_3d {
            &self.endpoint_3d
        } else {
            &self.endpoint
        }
    }
}

/// trace.moe engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceMoeConfig {
    /// Whether the engine takes part in searches.
    pub enabled: bool,
    /// Result pages to process.
    pub max_page: usize,
    /// API root.
    pub api_url: String,
    /// Preview image size requested from the API (`s`, `m`, `l`); empty for the API default.
    pub size: String,
    /// Strip black borders before matching.
    pub cut_borders: bool,
}

impl Default for TraceMoeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_page: 1,
            api_url: "https://api.trace.moe".to_owned(),
            size: String::new(),
            cut_borders: true,
        }
    }
}

/// Fluffle engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluffleConfig {
    /// Whether the engine takes part in searches.
    pub enabled: bool,
    /// Result pages to process.
    pub max_page: usize,
    /// Search endpoint.
    pub endpoint: String,
    /// Keep only exact matches.
    pub exact_match: bool,
    /// Include NSFW sources.
    pub include_nsfw: bool,
}

impl Default for FluffleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_page: 1,
            endpoint: "https://api.fluffle.xyz/v1/search".to_owned(),
            exact_match: true,
            include_nsfw: true,
        }
    }
}

/// Link preview settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkPreviewConfig {
    /// Seconds a cached API payload stays valid. `0` keeps payloads forever.
    pub cache_ttl_seconds: u64,
    /// e621 credentials and endpoint.
    pub e621: E621Config,
    /// Rule34 endpoint.
    pub rule34: Rule34Config,
    /// Bluesky credentials and endpoint.
    pub bluesky: BlueskyConfig,
    /// Bilibili endpoints.
    pub bilibili: BilibiliConfig,
    /// YouTube Data API credentials and endpoint.
    pub youtube: YoutubeConfig,
    /// FurAffinity session cookies and site root.
    pub furaffinity: FurAffinityConfig,
}

impl Default for LinkPreviewConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 0,
            e621: E621Config::default(),
            rule34: Rule34Config::default(),
            bluesky: BlueskyConfig::default(),
            bilibili: BilibiliConfig::default(),
            youtube: YoutubeConfig::default(),
            furaffinity: FurAffinityConfig::default(),
        }
    }
}

/// e621 settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct E621Config {
    /// Account name sent in the User-Agent and Basic auth header.
    pub username: String,
    /// API key for Basic auth.
    pub api_key: String,
    /// API root.
    pub api_url: String,
}

impl Default for E621Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            api_key: String::new(),
            api_url: "https://e621.net".to_owned(),
        }
    }
}

/// Rule34 settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule34Config {
    /// API root.
    pub api_url: String,
}

impl Default for Rule34Config {
    fn default() -> Self {
        Self {
            api_url: "https://api.rule34.xxx".to_owned(),
        }
    }
}

/// Bluesky settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    /// Optional bearer token.
    pub bearer: String,
    /// AppView API root.
    pub api_url: String,
    /// Video CDN root for thumbnails missing from the embed.
    pub video_url: String,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            bearer: String::new(),
            api_url: "https://public.api.bsky.app".to_owned(),
            video_url: "https://video.bsky.app".to_owned(),
        }
    }
}

/// Bilibili settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilibiliConfig {
    /// API root.
    pub api_url: String,
    /// Short link root.
    pub short_url: String,
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.bilibili.com".to_owned(),
            short_url: "https://b23.tv".to_owned(),
        }
    }
}

/// YouTube settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    /// Data API v3 key.
    pub api_key: String,
    /// Data API root.
    pub api_url: String,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://www.googleapis.com/youtube/v3".to_owned(),
        }
    }
}

/// FurAffinity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FurAffinityConfig {
    /// Value of the `a` session cookie.
    pub cookie_a: String,
    /// Value of the `b` session cookie.
    pub cookie_b: String,
    /// Site root.
    pub base_url: String,
}

impl Default for FurAffinityConfig {
    fn default() -> Self {
        Self {
            cookie_a: String::new(),
            cookie_b: String::new(),
            base_url: "https://www.furaffinity.net".to_owned(),
        }
    }
}

/// Rendering service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Root URL of the screenshot service.
    pub endpoint: String,
    /// Viewport width in CSS pixels.
    pub width: u32,
    /// Device scale factor.
    pub scale: f64,
    /// JPEG quality for search results.
    pub quality: u8,
    /// Pick preview quality from the rendered height.
    pub auto_quality: bool,
    /// Seconds to wait for a page to signal readiness.
    pub ready_timeout_seconds: u64,
    /// Milliseconds between readiness polls.
    pub poll_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8931".to_owned(),
            width: 720,
            scale: 1.5,
            quality: 90,
            auto_quality: true,
            ready_timeout_seconds: 30,
            poll_interval_ms: 250,
        }
    }
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Fixed User-Agent. `None` rotates through a built-in list.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 20,
            user_agent: None,
        }
    }
}

impl ScryConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ScryError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ScryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates this configuration.
    ///
    /// Checks:
    /// - `default_count` must be greater than 0
    /// - every engine's `max_page` must be greater than 0
    /// - `render.width` and `render.ready_timeout_seconds` must be greater than 0
    /// - `render.scale` must be positive
    /// - `render.quality` must be in `1..=100`
    /// - `http.timeout_seconds` must be greater than 0
    pub fn validate(&self) -> Result<()> {
        let search = &self.image_search;
        if search.default_count == 0 {
            return Err(ScryError::Config(
                "image_search.default_count must be greater than 0".into(),
            ));
        }
        for (name, max_page) in [
            ("saucenao", search.saucenao.max_page),
            ("iqdb", search.iqdb.max_page),
            ("tracemoe", search.tracemoe.max_page),
            ("fluffle", search.fluffle.max_page),
        ] {
            if max_page == 0 {
                return Err(ScryError::Config(format!(
                    "image_search.{name}.max_page must be greater than 0"
                )));
            }
        }
        if self.render.width == 0 {
            return Err(ScryError::Config("render.width must be greater than 0".into()));
        }
        if !(self.render.scale > 0.0) {
            return Err(ScryError::Config("render.scale must be positive".into()));
        }
        if !(1..=100).contains(&self.render.quality) {
            return Err(ScryError::Config("render.quality must be in 1..=100".into()));
        }
        if self.render.ready_timeout_seconds == 0 {
            return Err(ScryError::Config(
                "render.ready_timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.http.timeout_seconds == 0 {
            return Err(ScryError::Config(
                "http.timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Where configuration is read from.
///
/// Each [`ConfigSource::load`] re-reads the file so edits take effect on
/// the next request.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    path: PathBuf,
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::new(crate::scry_dirs::config_file())
    }
}

impl ConfigSource {
    /// Reads from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the current configuration. A missing file
    /// yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(&self) -> Result<ScryConfig> {
        let config = if self.path.exists() {
            ScryConfig::from_file(&self.path)?
        } else {
            tracing::debug!(path = %self.path.display(), "config file missing, using defaults");
            ScryConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ScryConfig::default();
        assert_eq!(config.image_search.default_similarity, -9999.0);
        assert_eq!(config.image_search.default_count, 30);
        assert_eq!(config.image_search.default_engine, "all");
        assert_eq!(config.image_search.saucenao.min_sim, 75);
        assert_eq!(config.image_search.saucenao.hide, 2);
        assert!(config.image_search.fluffle.exact_match);
        assert_eq!(config.render.width, 720);
        assert_eq!(config.render.scale, 1.5);
        assert_eq!(config.render.ready_timeout_seconds, 30);
        assert_eq!(config.link_preview.youtube.api_url, "https://www.googleapis.com/youtube/v3");
        assert_eq!(config.link_preview.furaffinity.base_url, "https://www.furaffinity.net");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ScryConfig::default();
        config.image_search.saucenao.api_key = "key".into();
        config.link_preview.e621.username = "someone".into();
        config.link_preview.furaffinity.cookie_a = "cookie".into();
        config.render.quality = 75;

        config.save_to_file(&path).expect("save");
        let loaded = ScryConfig::from_file(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config: ScryConfig = toml::from_str(
            r#"
            [image_search]
            default_count = 5

            [image_search.iqdb]
            enabled = false
            "#,
        )
        .expect("parse");
        assert_eq!(config.image_search.default_count, 5);
        assert!(!config.image_search.iqdb.enabled);
        assert_eq!(config.image_search.iqdb.max_page, 1);
        assert!(config.image_search.saucenao.enabled);
        assert_eq!(config.render.width, 720);
    }

    #[test]
    fn zero_count_rejected() {
        let mut config = ScryConfig::default();
        config.image_search.default_count = 0;
        assert!(matches!(config.validate(), Err(ScryError::Config(_))));
    }

    #[test]
    fn zero_max_page_rejected() {
        let mut config = ScryConfig::default();
        config.image_search.tracemoe.max_page = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tracemoe"));
    }

    #[test]
    fn bad_render_settings_rejected() {
        let mut config = ScryConfig::default();
        config.render.scale = 0.0;
        assert!(config.validate().is_err());

        let mut config = ScryConfig::default();
        config.render.scale = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ScryConfig::default();
        config.render.quality = 0;
        assert!(config.validate().is_err());

        let mut config = ScryConfig::default();
        config.render.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn iqdb_endpoint_follows_index() {
        let mut iqdb = IqdbConfig::default();
        assert_eq!(iqdb.active_endpoint(), "https://iqdb.org/");
        iqdb.is_3d = true;
        assert_eq!(iqdb.active_endpoint(), "https://3d.iqdb.org/");
    }

    #[test]
    fn source_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = ConfigSource::new(dir.path().join("absent.toml"));
        assert_eq!(source.load().expect("load"), ScryConfig::default());
    }

    #[test]
    fn source_rereads_on_every_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let source = ConfigSource::new(&path);

        std::fs::write(&path, "[image_search]\ndefault_count = 3\n").expect("write");
        assert_eq!(source.load().expect("load").image_search.default_count, 3);

        std::fs::write(&path, "[image_search]\ndefault_count = 7\n").expect("write");
        assert_eq!(source.load().expect("load").image_search.default_count, 7);
    }

    #[test]
    fn source_rejects_invalid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[render]\nwidth = 0\n").expect("write");
        assert!(ConfigSource::new(&path).load().is_err());

        std::fs::write(&path, "not = [valid").expect("write");
        assert!(ConfigSource::new(&path).load().is_err());
    }
}
