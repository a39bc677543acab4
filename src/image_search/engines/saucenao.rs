//! SauceNAO engine: multipart upload to the JSON search API.

use serde::Deserialize;
use scry_core::{BackendError, Harvest};

use super::image_part;
use crate::http;
use crate::image_search::collect::{collect, Candidate};
use crate::image_search::{EngineContext, ImageEngine, SearchInput};

/// Results requested per page.
pub const PAGE_SIZE: usize = 5;

#[derive(Debug, Deserialize)]
struct Response {
    header: ResponseHeader,
    #[serde(default)]
    results: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct ResponseHeader {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    header: EntryHeader,
    #[serde(default)]
    data: EntryData,
}

#[derive(Debug, Deserialize)]
struct EntryHeader {
    #[serde(default)]
    thumbnail: String,
    #[serde(default)]
    index_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct EntryData {
    #[serde(default)]
    ext_urls: Vec<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// Parses a SauceNAO JSON reply.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] when the body is not a SauceNAO reply
/// or its header reports a non-zero status.
pub fn parse_results(body: &str) -> Result<Vec<Candidate>, BackendError> {
    let response: Response = serde_json::from_str(body)
        .map_err(|e| BackendError::Backend(format!("SauceNAO returned invalid JSON: {e}")))?;
    if response.header.status != 0 {
        let message = response.header.message.unwrap_or_default();
        return Err(BackendError::Backend(format!(
            "SauceNAO status {}: {}",
            response.header.status,
            message.trim()
        )));
    }

    Ok(response
        .results
        .into_iter()
        .map(|entry| {
            let url = entry
                .data
                .ext_urls
                .into_iter()
                .next()
                .or(entry.data.source)
                .unwrap_or_default();
            let text = entry
                .data
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or(entry.header.index_name);
            Candidate::new(url, entry.header.thumbnail, text)
        })
        .filter(|c| !c.url.is_empty())
        .collect())
}

/// Runs one SauceNAO search.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] on transport or API failure.
pub async fn search(ctx: &EngineContext, input: &SearchInput) -> Result<Harvest, BackendError> {
    let cfg = &ctx.config.saucenao;
    let engine = ImageEngine::SauceNao;
    let limit = engine.candidate_limit(&ctx.config);
    tracing::info!(engine = engine.name(), "searching");

    let numres = limit.to_string();
    let minsim = cfg.min_sim.to_string();
    let hide = cfg.hide.to_string();
    let mut query = vec![
        ("output_type", "2"),
        ("numres", numres.as_str()),
        ("minsim", minsim.as_str()),
        ("hide", hide.as_str()),
        ("db", "999"),
    ];
    if !cfg.api_key.is_empty() {
        query.push(("api_key", cfg.api_key.as_str()));
    }

    let form = reqwest::multipart::Form::new().part("file", image_part(&input.bytes)?);
    let body = http::send(
        ctx.client.post(&cfg.endpoint).query(&query).multipart(form),
        engine.name(),
    )
    .await?
    .text()
    .await
    .map_err(|e| BackendError::Backend(format!("SauceNAO response read failed: {e}")))?;

    let candidates = parse_results(&body)?;
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
