//! Reverse image search across several engines.
//!
//! Each engine is a variant of [`ImageEngine`], registered under its key by
//! [`build_engines`]. A search prepares one [`Task`] per selected engine,
//! runs them concurrently and merges the per-engine accumulators into a
//! single ranked aggregate.

pub mod collect;
pub mod engines;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use scry_core::{
    Accumulator, BackendError, Harvest, LinkPatterns, Registry, RenderOptions, Renderer, Task,
};
use sha2::{Digest, Sha256};

use crate::config::ImageSearchConfig;
use crate::error::{Result, ScryError};

/// Engine selector meaning "every enabled engine".
pub const ALL_ENGINES: &str = "all";

/// The query image.
#[derive(Debug, Clone)]
pub struct SearchInput {
    /// Encoded image bytes.
    pub bytes: Bytes,
    /// Lowercase hex SHA-256 of `bytes`.
    pub digest: String,
}

impl SearchInput {
    /// Wraps in-memory image bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let digest = format!("{:x}", Sha256::digest(&bytes));
        Self { bytes, digest }
    }

    /// Reads the query image from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Io`] if the file cannot be read and
    /// [`ScryError::Image`] if it is empty.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Err(ScryError::Image(format!("{} is empty", path.display())));
        }
        Ok(Self::from_bytes(bytes))
    }
}

/// Shared state handed to every engine task.
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Shared HTTP client.
    pub client: reqwest::Client,
    /// Image search settings, re-read per request.
    pub config: ImageSearchConfig,
    /// Directory receiving downloaded thumbnails.
    pub scratch_dir: PathBuf,
}

/// The supported search engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEngine {
    /// SauceNAO JSON API.
    SauceNao,
    /// IQDB HTML results page.
    Iqdb,
    /// trace.moe anime scene search.
    TraceMoe,
    /// Fluffle furry art search.
    Fluffle,
}

impl ImageEngine {
    /// Every engine, in registration order.
    pub const ALL: [ImageEngine; 4] = [
        ImageEngine::SauceNao,
        ImageEngine::Iqdb,
        ImageEngine::TraceMoe,
        ImageEngine::Fluffle,
    ];

    /// Registry key.
    pub fn key(self) -> &'static str {
        match self {
            Self::SauceNao => "saucenao",
            Self::Iqdb => "iqdb",
            Self::TraceMoe => "tracemoe",
            Self::Fluffle => "fluffle",
        }
    }

    /// Display name used in results and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::SauceNao => "SauceNAO",
            Self::Iqdb => "IQDB",
            Self::TraceMoe => "TraceMoe",
            Self::Fluffle => "Fluffle",
        }
    }

    /// Engine icon shown next to each result.
    pub fn icon(self) -> &'static str {
        match self {
            Self::SauceNao => "https://www.google.com/s2/favicons?domain=saucenao.com",
            Self::Iqdb => "https://www.google.com/s2/favicons?domain=iqdb.org",
            Self::TraceMoe => "https://www.google.com/s2/favicons?domain=trace.moe",
            Self::Fluffle => "https://www.google.com/s2/favicons?domain=fluffle.xyz",
        }
    }

    /// Results one page of this engine yields.
    pub fn page_size(self) -> usize {
        match self {
            Self::SauceNao => engines::saucenao::PAGE_SIZE,
            Self::Iqdb => engines::iqdb::PAGE_SIZE,
            Self::TraceMoe => engines::tracemoe::PAGE_SIZE,
            Self::Fluffle => engines::fluffle::PAGE_SIZE,
        }
    }

    /// Whether the engine is switched on in `config`.
    pub fn enabled(self, config: &ImageSearchConfig) -> bool {
        match self {
            Self::SauceNao => config.saucenao.enabled,
            Self::Iqdb => config.iqdb.enabled,
            Self::TraceMoe => config.tracemoe.enabled,
            Self::Fluffle => config.fluffle.enabled,
        }
    }

    /// Configured page limit, at least one.
    pub fn max_page(self, config: &ImageSearchConfig) -> usize {
        let pages = match self {
            Self::SauceNao => config.saucenao.max_page,
            Self::Iqdb => config.iqdb.max_page,
            Self::TraceMoe => config.tracemoe.max_page,
            Self::Fluffle => config.fluffle.max_page,
        };
        pages.max(1)
    }

    /// Most candidates this engine may contribute.
    pub fn candidate_limit(self, config: &ImageSearchConfig) -> usize {
        self.max_page(config) * self.page_size()
    }

    /// Prepares a search task, or `None` when the engine is disabled.
    pub fn prepare(
        self,
        ctx: &Arc<EngineContext>,
        input: &Arc<SearchInput>,
    ) -> Option<Task<Harvest>> {
        if !self.enabled(&ctx.config) {
            tracing::debug!(engine = self.name(), "engine disabled");
            return None;
        }
        let ctx = Arc::clone(ctx);
        let input = Arc::clone(input);
        Some(Task::pending(self.name(), async move {
            match self {
                Self::SauceNao => engines::saucenao::search(&ctx, &input).await,
                Self::Iqdb => engines::iqdb::search(&ctx, &input).await,
                Self::TraceMoe => engines::tracemoe::search(&ctx, &input).await,
                Self::Fluffle => engines::fluffle::search(&ctx, &input).await,
            }
        }))
    }
}

/// Registry holding every supported engine under its key.
pub fn build_engines() -> Registry<ImageEngine> {
    let mut registry = Registry::new("engine");
    for engine in ImageEngine::ALL {
        registry.register(engine.key(), engine);
    }
    registry
}

/// Prepares tasks for the selected engines.
///
/// `engine` of `None` or `"all"` selects every enabled engine.
///
/// # Errors
///
/// Returns [`BackendError::NotImplemented`] when a named engine is unknown
/// or disabled.
pub fn run_image_search(
    engines: &Registry<ImageEngine>,
    input: &Arc<SearchInput>,
    engine: Option<&str>,
    ctx: &Arc<EngineContext>,
) -> std::result::Result<Vec<Task<Harvest>>, BackendError> {
    let key = engine.filter(|e| !e.eq_ignore_ascii_case(ALL_ENGINES));
    let key = key.map(str::to_ascii_lowercase);
    engines.resolve(key.as_deref(), |e| e.prepare(ctx, input))
}

/// Caller-supplied overrides for one search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    /// Engine key, or `None` for the configured default.
    pub engine: Option<String>,
    /// Minimum similarity for uncertain results; configured default if unset.
    pub min_similarity: Option<f64>,
    /// Result cap; configured default if unset.
    pub max_count: Option<usize>,
}

/// Image search front door: engines plus the previewable-link patterns.
#[derive(Debug, Clone)]
pub struct ImageSearch {
    engines: Registry<ImageEngine>,
    patterns: LinkPatterns,
}

impl ImageSearch {
    /// Search over `engines`, flagging results that match `patterns`.
    pub fn new(engines: Registry<ImageEngine>, patterns: LinkPatterns) -> Self {
        Self { engines, patterns }
    }

    /// Registered engines.
    pub fn engines(&self) -> &Registry<ImageEngine> {
        &self.engines
    }

    /// Runs the selected engines concurrently and merges their results.
    ///
    /// Engine failures are captured as diagnostics; only selection errors
    /// fail the search.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Backend`] with `NotImplemented` when the
    /// requested engine is unknown or disabled.
    pub async fn search(
        &self,
        input: SearchInput,
        request: &SearchRequest,
        ctx: EngineContext,
    ) -> Result<Accumulator> {
        let min_similarity = request
            .min_similarity
            .unwrap_or(ctx.config.default_similarity);
        let max_count = request.max_count.unwrap_or(ctx.config.default_count);
        let engine = request
            .engine
            .clone()
            .unwrap_or_else(|| ctx.config.default_engine.clone());

        let input = Arc::new(input);
        let ctx = Arc::new(ctx);
        let tasks = run_image_search(&self.engines, &input, Some(&engine), &ctx)?;
        tracing::info!(
            engine = %engine,
            tasks = tasks.len(),
            digest = %input.digest,
            "starting image search"
        );

        let accumulators = join_all(tasks.into_iter().map(Accumulator::run)).await;
        for acc in &accumulators {
            for err in acc.errors() {
                tracing::warn!(error = %err, "engine failed");
            }
        }

        let mut merged = Accumulator::merge_all(accumulators, min_similarity, max_count);
        for item in merged.results_mut() {
            item.previewable = self.patterns.can_preview(&item.url);
        }
        tracing::info!(count = merged.results().len(), "image search complete");
        Ok(merged)
    }
}

/// Renders merged results, or returns `None` without calling the renderer
/// when nothing was found.
///
/// Owned thumbnails are released either way.
///
/// # Errors
///
/// Re-raises the renderer's error.
pub async fn render_results(
    merged: Accumulator,
    renderer: &dyn Renderer,
    options: &RenderOptions,
) -> Result<Option<Vec<u8>>> {
    if merged.results().is_empty() {
        tracing::info!(errors = merged.errors().len(), "no results found");
        return Ok(None);
    }
    Ok(Some(merged.render(renderer, options).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(config: ImageSearchConfig) -> Arc<EngineContext> {
        Arc::new(EngineContext {
            client: reqwest::Client::new(),
            config,
            scratch_dir: std::env::temp_dir(),
        })
    }

    #[test]
    fn digest_is_sha256_hex() {
        let input = SearchInput::from_bytes(b"abc".to_vec());
        assert_eq!(
            input.digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn registry_contains_every_engine() {
        let engines = build_engines();
        let keys: Vec<&str> = engines.keys().collect();
        assert_eq!(keys, ["saucenao", "iqdb", "tracemoe", "fluffle"]);
    }

    #[test]
    fn all_selects_enabled_engines_only() {
        let mut config = ImageSearchConfig::default();
        config.tracemoe.enabled = false;
        let input = Arc::new(SearchInput::from_bytes(vec![1]));
        let tasks = run_image_search(&build_engines(), &input, Some("all"), &context(config))
            .expect("tasks");
        let labels: Vec<&str> = tasks.iter().map(Task::label).collect();
        assert_eq!(labels, ["SauceNAO", "IQDB", "Fluffle"]);
    }

    #[test]
    fn named_engine_is_case_insensitive() {
        let input = Arc::new(SearchInput::from_bytes(vec![1]));
        let tasks = run_image_search(
            &build_engines(),
            &input,
            Some("IQDB"),
            &context(ImageSearchConfig::default()),
        )
        .expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].label(), "IQDB");
    }

    #[test]
    fn disabled_or_unknown_engine_is_not_implemented() {
        let mut config = ImageSearchConfig::default();
        config.fluffle.enabled = false;
        let ctx = context(config);
        let input = Arc::new(SearchInput::from_bytes(vec![1]));
        let engines = build_engines();

        let err = run_image_search(&engines, &input, Some("fluffle"), &ctx).unwrap_err();
        assert!(err.is_not_implemented());
        let err = run_image_search(&engines, &input, Some("google"), &ctx).unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[test]
    fn candidate_limit_uses_page_size() {
        let mut config = ImageSearchConfig::default();
        config.iqdb.max_page = 0;
        config.saucenao.max_page = 3;
        assert_eq!(
            ImageEngine::Iqdb.candidate_limit(&config),
            engines::iqdb::PAGE_SIZE
        );
        assert_eq!(
            ImageEngine::SauceNao.candidate_limit(&config),
            3 * engines::saucenao::PAGE_SIZE
        );
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let err = SearchInput::from_path(file.path()).await.unwrap_err();
        assert!(matches!(err, ScryError::Image(_)));
    }
}
