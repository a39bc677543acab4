//! Rendering collaborator contract and the search-result document.
//!
//! Rendering is the terminal step of a request. The caller holds an
//! [`crate::ArtifactScope`] for the whole call so thumbnails stay on disk
//! while the collaborator loads them and are released afterwards.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Value};

use crate::accumulator::Accumulator;
use crate::error::BackendError;
use crate::types::{Mark, ResultItem, Similarity};

/// Timestamp format used in rendered metadata.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Favicon service prefix; the result host is appended.
pub const FAVICON_ENDPOINT: &str = "https://www.google.com/s2/favicons?domain=";

/// JPEG quality selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "value")]
pub enum Quality {
    /// Use this quality.
    Fixed(u8),
    /// Pick from the rendered page height, see [`auto_quality`].
    Auto,
}

impl Default for Quality {
    fn default() -> Self {
        Self::Fixed(90)
    }
}

/// Quality for a page of `height` CSS pixels. Taller pages compress harder.
pub fn auto_quality(height: u32) -> u8 {
    match height {
        h if h > 25_000 => 60,
        h if h > 20_000 => 70,
        h if h > 10_000 => 80,
        _ => 90,
    }
}

/// Everything a rendering collaborator needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    /// Template the collaborator should lay the document out with.
    pub template: String,
    /// Structured document.
    pub document: Value,
    /// Viewport width in CSS pixels.
    pub width: u32,
    /// Device scale factor.
    pub scale: f64,
    /// JPEG quality.
    pub quality: Quality,
}

/// Turns a structured document into image bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Renders `request`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Render`] or [`BackendError::Timeout`] when the
    /// collaborator fails.
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, BackendError>;
}

/// Per-render settings for search results.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// When the search started; drives total time and `_meta.search_time`.
    pub started_at: DateTime<Local>,
    /// Template name.
    pub template: String,
    /// Viewport width.
    pub width: u32,
    /// Device scale factor.
    pub scale: f64,
    /// JPEG quality.
    pub quality: Quality,
}

impl RenderOptions {
    /// Options with the default layout (720 px, scale 1.5, quality 90).
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            template: "image_search".to_owned(),
            width: 720,
            scale: 1.5,
            quality: Quality::default(),
        }
    }
}

/// Zero-padded seconds with two decimals, e.g. `01.50`.
pub fn format_seconds(elapsed: Duration) -> String {
    format!("{:05.2}", elapsed.as_secs_f64())
}

/// Favicon URL for the host of `url`, if it has one.
pub fn favicon_for(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(|host| format!("{FAVICON_ENDPOINT}{host}"))
}

/// Layout columns for `count` results.
pub fn column_count(count: usize) -> usize {
    match count {
        0 | 1 => 1,
        n if n < 10 => 2,
        _ => 3,
    }
}

fn result_entry(index: usize, item: &ResultItem) -> Value {
    let similarity = match item.similarity.rounded() {
        Similarity::Exact => json!("exact"),
        Similarity::Score(v) => json!(v),
    };
    json!({
        "index": index + 1,
        "url": item.url,
        "thumbnail": item.thumbnail,
        "text": item.text,
        "similarity": similarity,
        "engine": item.engine,
        "engine_icon": item.engine_icon,
        "favicon": favicon_for(&item.url),
        "mark": item.mark,
        "confirmed": item.mark == Mark::Confirmed,
        "previewable": item.previewable,
    })
}

impl Accumulator {
    /// Builds the structured document for the current results.
    pub fn document(&self, started_at: DateTime<Local>) -> Value {
        let now = Local::now();
        let total = (now - started_at).to_std().unwrap_or_default();

        let results: Vec<Value> = self
            .results()
            .iter()
            .enumerate()
            .map(|(i, item)| result_entry(i, item))
            .collect();
        let details: Vec<Value> = self
            .details()
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "count": d.count,
                    "time": format_seconds(d.elapsed),
                    "text": d.text,
                    "failed": d.failed,
                })
            })
            .collect();

        let mut doc = json!({
            "column_count": column_count(results.len()),
            "results": results,
            "details": {
                "search_details": details,
                "total_time": format_seconds(total),
            },
            "_meta": {
                "render_time": now.format(TIME_FORMAT).to_string(),
                "search_time": started_at.format(TIME_FORMAT).to_string(),
            },
        });

        // Zero limits are treated as unset and left out.
        if let (Some(limits), Some(obj)) = (self.limits(), doc.as_object_mut()) {
            if limits.min_similarity != 0.0 {
                obj.insert("min_similarity".into(), json!(limits.min_similarity));
            }
            if limits.max_count != 0 {
                obj.insert("max_count".into(), json!(limits.max_count));
            }
        }
        doc
    }

    /// Renders the aggregate and releases every owned artifact.
    ///
    /// Artifacts are held for the duration of the call and released on
    /// every exit path, including when the returned future is dropped.
    ///
    /// # Errors
    ///
    /// Re-raises the renderer's error after logging it.
    pub async fn render(
        self,
        renderer: &dyn Renderer,
        options: &RenderOptions,
    ) -> Result<Vec<u8>, BackendError> {
        let _scope = self.artifacts().scope();
        let request = RenderRequest {
            template: options.template.clone(),
            document: self.document(options.started_at),
            width: options.width,
            scale: options.scale,
            quality: options.quality,
        };

        tracing::debug!(results = self.results().len(), "rendering search results");
        match renderer.render(request).await {
            Ok(bytes) => {
                tracing::info!(bytes = bytes.len(), "search results rendered");
                Ok(bytes)
            }
            Err(e) => {
                tracing::error!(error = %e, "search result rendering failed");
                Err(e)
            }
        }
    }
}
