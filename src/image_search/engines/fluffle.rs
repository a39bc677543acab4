//! Fluffle engine: uploads a small PNG thumbnail of the query image.
//!
//! Exact matches are vouched for by Fluffle and become confirmed results
//! carrying Fluffle's own score. Everything else is scored locally.

use serde::Deserialize;
use scry_core::{BackendError, Harvest};

use crate::image_search::collect::{collect, Candidate};
use crate::image_search::{EngineContext, ImageEngine, SearchInput};
use crate::similarity::png_thumbnail;

/// Results Fluffle returns per search.
pub const PAGE_SIZE: usize = 32;

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    results: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    location: String,
    #[serde(default)]
    score: f64,
    #[serde(rename = "match", default)]
    match_kind: String,
    #[serde(default)]
    platform: String,
    thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    location: String,
}

/// Parses a Fluffle reply. With `exact_only`, non-exact matches are dropped.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] when the body is not a Fluffle reply or
/// is an error object.
pub fn parse_results(body: &str, exact_only: bool) -> Result<Vec<Candidate>, BackendError> {
    let response: Response = serde_json::from_str(body)
        .map_err(|e| BackendError::Backend(format!("Fluffle returned invalid JSON: {e}")))?;
    candidates(response, exact_only)
}

fn candidates(response: Response, exact_only: bool) -> Result<Vec<Candidate>, BackendError> {
    if let Some(code) = response.code {
        let message = response.message.unwrap_or(code);
        return Err(BackendError::Backend(format!("Fluffle error: {message}")));
    }

    Ok(response
        .results
        .into_iter()
        .filter_map(|entry| {
            let exact = entry.match_kind == "exact";
            if exact_only && !exact {
                return None;
            }
            let thumbnail = entry.thumbnail?.location;
            let candidate = Candidate::new(entry.location, thumbnail, entry.platform);
            Some(if exact {
                candidate.confirmed(entry.score)
            } else {
                candidate
            })
        })
        .collect())
}

/// Runs one Fluffle search.
///
/// # Errors
///
/// Returns [`BackendError::InvalidInput`] if the query image cannot be
/// thumbnailed and [`BackendError::Backend`] on transport or API failure.
pub async fn search(ctx: &EngineContext, input: &SearchInput) -> Result<Harvest, BackendError> {
    let cfg = &ctx.config.fluffle;
    let engine = ImageEngine::Fluffle;
    let limit = engine.candidate_limit(&ctx.config);
    tracing::info!(engine = engine.name(), "searching");

    let bytes = input.bytes.clone();
    let thumbnail = tokio::task::spawn_blocking(move || png_thumbnail(&bytes))
        .await
        .map_err(|e| BackendError::Backend(format!("thumbnail worker failed: {e}")))??;

    let part = reqwest::multipart::Part::bytes(thumbnail)
        .file_name("image.png")
        .mime_str("image/png")
        .map_err(|e| BackendError::InvalidInput(format!("invalid upload type: {e}")))?;
    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("includeNsfw", cfg.include_nsfw.to_string());

    // Fluffle reports API errors as JSON bodies on 4xx responses.
    let response = ctx
        .client
        .post(&cfg.endpoint)
        .multipart(form)
        .send()
        .await
        .map_err(|e| BackendError::Backend(format!("Fluffle request failed: {}", e.without_url())))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BackendError::Backend(format!("Fluffle response read failed: {e}")))?;
    let response: Response = match serde_json::from_str(&body) {
        Ok(response) => response,
        Err(_) if !status.is_success() => {
            return Err(BackendError::Backend(format!("Fluffle HTTP error: {status}")));
        }
        Err(e) => return Err(BackendError::Backend(format!("Fluffle returned invalid JSON: {e}"))),
    };
    let candidates = candidates(response, cfg.exact_match)?;

    tracing::info!(engine = engine.name(), count = candidates.len(), "search completed");
    Ok(collect(
        ctx,
        input,
        engine.name(),
        engine.icon(),
        candidates.into_iter().take(limit),
    )
    .await)
}
