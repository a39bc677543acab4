//! Turns engine candidates into ranked results with local thumbnails.
//!
//! Each candidate's thumbnail is downloaded (or decoded from a data URI),
//! compared against the query image and stored as an owned artifact. A
//! candidate that fails any step is logged and skipped; it never fails
//! the engine.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use scry_core::{BackendError, Harvest, Mark, ResultItem, Similarity, TempArtifact};

use super::{EngineContext, SearchInput};
use crate::http;
use crate::similarity::{decode_data_uri, image_similarity};

/// One raw match reported by an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Source page.
    pub url: String,
    /// Thumbnail as an `http(s)` URL or a `data:image/...;base64,` URI.
    pub thumbnail: String,
    /// Title or description.
    pub text: String,
    /// Engine-vouched score. Candidates carrying one are confirmed and
    /// keep that score instead of a computed similarity.
    pub confirmed_score: Option<f64>,
}

impl Candidate {
    /// Candidate whose similarity will be computed locally.
    pub fn new(url: impl Into<String>, thumbnail: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            thumbnail: thumbnail.into(),
            text: text.into(),
            confirmed_score: None,
        }
    }

    /// Marks the candidate as confirmed with the engine's score.
    #[must_use]
    pub fn confirmed(mut self, score: f64) -> Self {
        self.confirmed_score = Some(score);
        self
    }
}

/// Loads a thumbnail reference into bytes.
///
/// # Errors
///
/// Returns [`BackendError::InvalidInput`] for unsupported references and
/// [`BackendError::Backend`] for download failures.
pub async fn load_thumbnail(client: &reqwest::Client, reference: &str) -> Result<Bytes, BackendError> {
    if reference.starts_with("data:image") {
        decode_data_uri(reference).map(Bytes::from)
    } else if reference.starts_with("http") {
        http::fetch_bytes(client, reference, HeaderMap::new()).await
    } else {
        Err(BackendError::InvalidInput(format!(
            "unsupported thumbnail reference: {}",
            reference.chars().take(32).collect::<String>()
        )))
    }
}

async fn similarity_to(base: Bytes, thumbnail: Bytes) -> Result<f64, BackendError> {
    tokio::task::spawn_blocking(move || image_similarity(&thumbnail, &base))
        .await
        .map_err(|e| BackendError::Backend(format!("similarity worker failed: {e}")))?
}

async fn collect_one(
    ctx: &EngineContext,
    input: &SearchInput,
    engine: &str,
    icon: &str,
    candidate: Candidate,
) -> Result<(ResultItem, TempArtifact), BackendError> {
    let thumbnail = load_thumbnail(&ctx.client, &candidate.thumbnail).await?;

    let (similarity, mark) = match candidate.confirmed_score {
        Some(score) => (Similarity::Score(score), Mark::Confirmed),
        None => (
            Similarity::Score(similarity_to(input.bytes.clone(), thumbnail.clone()).await?),
            Mark::Uncertain,
        ),
    };

    let artifact = TempArtifact::from_bytes_in(&ctx.scratch_dir, &thumbnail)
        .map_err(|e| BackendError::Backend(format!("thumbnail store failed: {e}")))?;
    let item = ResultItem::new(candidate.url, engine, similarity)
        .with_thumbnail(artifact.url())
        .with_text(candidate.text)
        .with_icon(icon)
        .with_mark(mark);
    Ok((item, artifact))
}

/// Downloads, scores and stores every usable candidate.
pub async fn collect<I>(
    ctx: &EngineContext,
    input: &SearchInput,
    engine: &str,
    icon: &str,
    candidates: I,
) -> Harvest
where
    I: IntoIterator<Item = Candidate>,
{
    if let Err(e) = tokio::fs::create_dir_all(&ctx.scratch_dir).await {
        tracing::warn!(engine, error = %e, "scratch directory unavailable");
    }

    let mut harvest = Harvest::new();
    for candidate in candidates {
        if candidate.thumbnail.is_empty() {
            continue;
        }
        let url = candidate.url.clone();
        match collect_one(ctx, input, engine, icon, candidate).await {
            Ok((item, artifact)) => harvest.push(item, Some(artifact)),
            Err(e) => tracing::error!(engine, url = %url, error = %e, "failed to process thumbnail"),
        }
    }
    tracing::debug!(engine, count = harvest.len(), "candidates collected");
    harvest
}
