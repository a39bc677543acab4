//! Link previews: fetch a post from a supported site and render a card.
//!
//! Links are routed by host first and by scheme second (see
//! [`LinkDispatcher`]). Each site is a [`PreviewHandler`] variant whose
//! `prepare` step validates the link and returns a [`Task`] that fetches
//! the post, caches its JSON and media, and fills a [`Preview`].

pub mod bilibili;
pub mod bluesky;
pub mod e621;
pub mod format;
pub mod furaffinity;
pub mod rule34;
pub mod youtube;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Local;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use scry_core::{
    ArtifactSet, BackendError, Link, LinkDispatcher, LinkPatterns, Quality, RenderRequest,
    Renderer, Task, TempArtifact,
};

use crate::config::{LinkPreviewConfig, RenderConfig};
use crate::http;
use crate::storage::FileCache;

/// Timestamp format for `_meta` stamps and post times.
pub const TIME_FORMAT: &str = scry_core::render::TIME_FORMAT;

/// File name of the rendered card stored next to a post's cache entries.
pub const PREVIEW_FILE: &str = "preview.jpg";

/// Compiles a pattern known to be valid, once.
pub(crate) fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("built-in link pattern must compile"))
}

/// Shared state for preview tasks.
#[derive(Debug, Clone)]
pub struct PreviewContext {
    /// Shared HTTP client.
    pub client: reqwest::Client,
    /// Post and media cache.
    pub cache: FileCache,
    /// Site credentials and cache TTL, re-read per request.
    pub config: LinkPreviewConfig,
}

impl PreviewContext {
    fn ttl(&self) -> Option<Duration> {
        match self.config.cache_ttl_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// A rendered card and the media links to deliver after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewCard {
    /// Encoded card image.
    pub image: Vec<u8>,
    /// Media the card only shows a still of, such as video playlists.
    pub extra_media: Vec<String>,
}

/// A preview being assembled by a handler.
#[derive(Debug)]
pub struct Preview {
    url: Option<String>,
    template: Option<String>,
    data: Map<String, Value>,
    base_identifier: Vec<String>,
    artifacts: ArtifactSet,
    cached: HashMap<String, String>,
    extra_media: Vec<String>,
    ctx: Arc<PreviewContext>,
}

impl Preview {
    /// Empty preview bound to `ctx`.
    pub fn new(ctx: Arc<PreviewContext>) -> Self {
        Self {
            url: None,
            template: None,
            data: Map::new(),
            base_identifier: Vec::new(),
            artifacts: ArtifactSet::new(),
            cached: HashMap::new(),
            extra_media: Vec::new(),
            ctx,
        }
    }

    /// Shared context.
    pub fn context(&self) -> Arc<PreviewContext> {
        Arc::clone(&self.ctx)
    }

    /// Sets the canonical link shown on the card.
    pub fn set_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.url = Some(url.into());
        self
    }

    /// Canonical link, once set.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Sets the template the renderer lays the card out with.
    pub fn set_template(&mut self, template: impl Into<String>) -> &mut Self {
        self.template = Some(template.into());
        self
    }

    /// Template, once set.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Sets the cache prefix for this post, e.g. `["e621", "123"]`.
    pub fn set_base_identifier<I, S>(&mut self, identifier: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.base_identifier = identifier.into_iter().map(|s| s.to_string()).collect();
        self
    }

    /// Cache prefix for this post.
    pub fn base_identifier(&self) -> &[String] {
        &self.base_identifier
    }

    /// Adds a top-level document field.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Document fields collected so far.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Media links to deliver alongside the card.
    pub fn extra_media(&self) -> &[String] {
        &self.extra_media
    }

    /// Queues a media link for delivery after the card.
    pub fn push_extra_media(&mut self, url: impl Into<String>) {
        self.extra_media.push(url.into());
    }

    /// Cached files referenced by the document.
    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    fn stamp(&mut self, key: &str, time: chrono::DateTime<Local>) {
        let formatted = Value::String(time.format(TIME_FORMAT).to_string());
        let meta = self
            .data
            .entry("_meta")
            .or_insert_with(|| Value::Object(Map::new()));
        match meta {
            Value::Object(map) => {
                map.insert(key.to_owned(), formatted);
            }
            other => {
                let mut map = Map::new();
                map.insert(key.to_owned(), formatted);
                *other = Value::Object(map);
            }
        }
    }

    fn post_identifier(&self, identifier: &[&str]) -> Vec<String> {
        self.base_identifier
            .iter()
            .cloned()
            .chain(identifier.iter().map(|s| (*s).to_owned()))
            .collect()
    }

    fn asset_identifier(url: &str) -> Vec<String> {
        let mut id = vec!["asset".to_owned()];
        match url::Url::parse(url) {
            Ok(parsed) => {
                id.extend(parsed.host_str().map(str::to_owned));
                id.extend(
                    parsed
                        .path_segments()
                        .into_iter()
                        .flatten()
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned),
                );
            }
            Err(_) => id.push(url.replace(['/', ':', '?'], "_")),
        }
        id
    }

    /// Fetches `url` through the cache and returns a `file://` URL for it.
    ///
    /// With an `identifier` the file lives under this post's base
    /// identifier; without one it is shared under `asset/<host>/<path>`.
    /// Existing cache entries are reused as-is. The same URL is only
    /// cached once per preview.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Backend`] if the download or cache write fails.
    pub async fn cache(
        &mut self,
        url: &str,
        identifier: Option<&[&str]>,
        headers: HeaderMap,
    ) -> Result<String, BackendError> {
        if let Some(file_url) = self.cached.get(url) {
            return Ok(file_url.clone());
        }

        let id = match identifier {
            Some(id) => self.post_identifier(id),
            None => Self::asset_identifier(url),
        };
        let cache = &self.ctx.cache;
        let path = if cache.exists(&id) {
            tracing::debug!(path = %cache.path(&id).display(), "using cached file");
            cache.path(&id)
        } else {
            tracing::debug!(path = %cache.path(&id).display(), "updating cache");
            let data = http::fetch_bytes(&self.ctx.client, url, headers).await?;
            cache
                .write(&id, &data)
                .await
                .map_err(|e| BackendError::Backend(format!("cache write failed: {e}")))?
        };

        let artifact = TempArtifact::borrowed(path);
        let file_url = artifact.url();
        self.artifacts.push(artifact);
        self.cached.insert(url.to_owned(), file_url.clone());
        Ok(file_url)
    }

    /// Loads a cached JSON payload for this post, honouring the cache TTL.
    ///
    /// Stamps `_meta.cache_time` with the entry's modification time. A
    /// corrupt entry is treated as missing.
    pub async fn load_cached(&mut self, identifier: &[&str]) -> Option<Value> {
        let id = self.post_identifier(identifier);
        let cache = &self.ctx.cache;
        if !cache.is_fresh(&id, self.ctx.ttl()) {
            return None;
        }
        let bytes = cache.read(&id).await.ok()?;
        let value = match serde_json::from_slice::<Value>(&bytes) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %cache.path(&id).display(), error = %e, "ignoring corrupt cache entry");
                return None;
            }
        };
        if let Ok(modified) = cache.modified_time(&id) {
            self.stamp("cache_time", modified);
        }
        Some(value)
    }

    /// Stores a JSON payload for this post and stamps `_meta.fetch_time`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Backend`] if the cache cannot be written.
    pub async fn store_cached(&mut self, identifier: &[&str], value: &Value) -> Result<(), BackendError> {
        self.stamp("fetch_time", Local::now());
        let id = self.post_identifier(identifier);
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| BackendError::Backend(format!("cache encode failed: {e}")))?;
        self.ctx
            .cache
            .write(&id, &body)
            .await
            .map_err(|e| BackendError::Backend(format!("cache write failed: {e}")))?;
        Ok(())
    }

    /// Returns the cached payload, or awaits `fetch` and caches its result.
    ///
    /// # Errors
    ///
    /// Propagates errors from `fetch` and from the cache write.
    pub async fn cached_json<F>(&mut self, identifier: &[&str], fetch: F) -> Result<Value, BackendError>
    where
        F: Future<Output = Result<Value, BackendError>>,
    {
        if let Some(value) = self.load_cached(identifier).await {
            tracing::debug!(identifier = ?self.post_identifier(identifier), "using cached post");
            return Ok(value);
        }
        let value = fetch.await?;
        self.store_cached(identifier, &value).await?;
        Ok(value)
    }

    /// Like [`Preview::cached_json`] for raw page text.
    ///
    /// # Errors
    ///
    /// Propagates errors from `fetch` and from the cache write.
    pub async fn cached_text<F>(&mut self, identifier: &[&str], fetch: F) -> Result<String, BackendError>
    where
        F: Future<Output = Result<String, BackendError>>,
    {
        let id = self.post_identifier(identifier);
        let ctx = Arc::clone(&self.ctx);
        if ctx.cache.is_fresh(&id, ctx.ttl()) {
            if let Ok(bytes) = ctx.cache.read(&id).await {
                if let Ok(modified) = ctx.cache.modified_time(&id) {
                    self.stamp("cache_time", modified);
                }
                tracing::debug!(identifier = ?id, "using cached page");
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
        }

        let text = fetch.await?;
        self.stamp("fetch_time", Local::now());
        ctx.cache
            .write(&id, text.as_bytes())
            .await
            .map_err(|e| BackendError::Backend(format!("cache write failed: {e}")))?;
        Ok(text)
    }

    /// The document handed to the renderer: collected data plus `url`.
    pub fn document(&self) -> Value {
        let mut doc = self.data.clone();
        if let Some(url) = &self.url {
            doc.insert("url".into(), Value::String(url.clone()));
        }
        Value::Object(doc)
    }

    /// Renders the card.
    ///
    /// Cached files stay registered for the duration of the call. On success
    /// the image is also written to the post's cache directory.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Render`] when no URL or template was set, and
    /// re-raises renderer failures after logging them.
    pub async fn render(mut self, renderer: &dyn Renderer, config: &RenderConfig) -> Result<Vec<u8>, BackendError> {
        let Some(url) = self.url.clone() else {
            return Err(BackendError::Render("URL is not set".into()));
        };
        let Some(template) = self.template.clone() else {
            return Err(BackendError::Render("template is not set".into()));
        };

        let artifacts = std::mem::take(&mut self.artifacts);
        let _scope = artifacts.scope();
        self.stamp("render_time", Local::now());

        let quality = if config.auto_quality {
            Quality::Auto
        } else {
            Quality::Fixed(config.quality)
        };
        let request = RenderRequest {
            template,
            document: self.document(),
            width: config.width,
            scale: config.scale,
            quality,
        };

        tracing::debug!(url = %url, "start rendering preview");
        let image = match renderer.render(request).await {
            Ok(image) => image,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "preview rendering failed");
                return Err(e);
            }
        };
        tracing::info!(url = %url, bytes = image.len(), "preview rendered");

        if !self.base_identifier.is_empty() {
            let id = self.post_identifier(&[PREVIEW_FILE]);
            match self.ctx.cache.write(&id, &image).await {
                Ok(path) => tracing::debug!(path = %path.display(), "saved preview image"),
                Err(e) => tracing::warn!(error = %e, "could not save preview image"),
            }
        }
        Ok(image)
    }

    /// Renders the card and hands back the queued extra media with it.
    ///
    /// # Errors
    ///
    /// Same as [`Preview::render`].
    pub async fn render_card(
        mut self,
        renderer: &dyn Renderer,
        config: &RenderConfig,
    ) -> Result<PreviewCard, BackendError> {
        let extra_media = std::mem::take(&mut self.extra_media);
        let image = self.render(renderer, config).await?;
        Ok(PreviewCard { image, extra_media })
    }
}

/// The supported sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewHandler {
    /// e621 posts.
    E621,
    /// Rule34 posts.
    Rule34,
    /// Bluesky posts, by web link or `at://` URI.
    Bluesky,
    /// Bilibili videos.
    BilibiliVideo,
    /// `b23.tv` short links.
    BilibiliShort,
    /// YouTube videos, by watch or `youtu.be` link.
    Youtube,
    /// FurAffinity submissions.
    FurAffinity,
}

impl PreviewHandler {
    /// Label used in logs and task diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::E621 => "e621",
            Self::Rule34 => "rule34",
            Self::Bluesky => "bluesky",
            Self::BilibiliVideo => "bilibili",
            Self::BilibiliShort => "bilibili-short",
            Self::Youtube => "youtube",
            Self::FurAffinity => "furaffinity",
        }
    }

    /// Validates `link` and prepares the fetch.
    pub fn prepare(self, link: &Link, ctx: Arc<PreviewContext>) -> Task<Preview> {
        match self {
            Self::E621 => e621::prepare(link, ctx),
            Self::Rule34 => rule34::prepare(link, ctx),
            Self::Bluesky => bluesky::prepare(link, ctx),
            Self::BilibiliVideo => bilibili::prepare_video(link, ctx),
            Self::BilibiliShort => bilibili::prepare_short(link, ctx),
            Self::Youtube => youtube::prepare(link, ctx),
            Self::FurAffinity => furaffinity::prepare(link, ctx),
        }
    }
}

/// Dispatcher with every site registered.
pub fn build_dispatcher() -> LinkDispatcher<PreviewHandler> {
    let mut dispatcher = LinkDispatcher::new();
    dispatcher
        .register_domain("e621.net", PreviewHandler::E621)
        .register_domain("rule34.xxx", PreviewHandler::Rule34)
        .register_domain("bsky.app", PreviewHandler::Bluesky)
        .register_scheme("at", PreviewHandler::Bluesky);
    for domain in bilibili::VIDEO_DOMAINS {
        dispatcher.register_domain(domain, PreviewHandler::BilibiliVideo);
    }
    for domain in bilibili::SHORT_DOMAINS {
        dispatcher.register_domain(domain, PreviewHandler::BilibiliShort);
    }
    for domain in youtube::DOMAINS {
        dispatcher.register_domain(domain, PreviewHandler::Youtube);
    }
    for domain in furaffinity::DOMAINS {
        dispatcher.register_domain(domain, PreviewHandler::FurAffinity);
    }
    dispatcher
}

/// Extraction patterns for every site, in registration order.
///
/// # Errors
///
/// Returns [`BackendError::Config`] if a pattern fails to compile.
pub fn build_patterns() -> Result<LinkPatterns, BackendError> {
    let mut patterns = LinkPatterns::new();
    for pattern in e621::LINK_PATTERNS
        .iter()
        .chain(rule34::LINK_PATTERNS)
        .chain(bluesky::LINK_PATTERNS)
        .chain(bilibili::LINK_PATTERNS)
        .chain(youtube::LINK_PATTERNS)
        .chain(furaffinity::LINK_PATTERNS)
    {
        patterns.register_str(pattern)?;
    }
    Ok(patterns)
}

/// Routes `link` and prepares its preview task.
///
/// # Errors
///
/// - [`BackendError::InvalidInput`] if the link has no host.
/// - [`BackendError::NotImplemented`] if no site handles it.
pub fn preview_link(
    dispatcher: &LinkDispatcher<PreviewHandler>,
    link: &str,
    ctx: Arc<PreviewContext>,
) -> Result<Task<Preview>, BackendError> {
    let resolved = dispatcher.resolve(link)?;
    tracing::debug!(handler = resolved.handler.name(), route = ?resolved.route, "preview dispatched");
    Ok(resolved.handler.prepare(&resolved.link, ctx))
}

/// Link preview front door: dispatcher plus extraction patterns.
#[derive(Debug, Clone)]
pub struct LinkPreviewer {
    dispatcher: LinkDispatcher<PreviewHandler>,
    patterns: LinkPatterns,
}

impl LinkPreviewer {
    /// Previewer with every built-in site.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if a built-in pattern is invalid.
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self {
            dispatcher: build_dispatcher(),
            patterns: build_patterns()?,
        })
    }

    /// Extraction patterns.
    pub fn patterns(&self) -> &LinkPatterns {
        &self.patterns
    }

    /// Supported links found in `text`.
    pub fn extract(&self, text: &str) -> Vec<String> {
        self.patterns.extract(text)
    }

    /// Whether `link` looks previewable.
    pub fn can_preview(&self, link: &str) -> bool {
        self.patterns.can_preview(link)
    }

    /// See [`preview_link`].
    ///
    /// # Errors
    ///
    /// Same as [`preview_link`].
    pub fn preview(&self, link: &str, ctx: Arc<PreviewContext>) -> Result<Task<Preview>, BackendError> {
        preview_link(&self.dispatcher, link, ctx)
    }
}
