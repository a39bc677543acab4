//! trace.moe engine: raw image upload, anime scene matches as JSON.

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use scry_core::{BackendError, Harvest};

use super::upload_meta;
use crate::http;
use crate::image_search::collect::{collect, Candidate};
use crate::image_search::{EngineContext, ImageEngine, SearchInput};

/// Scene matches returned per search.
pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    error: String,
    #[serde(default)]
    result: Vec<Scene>,
}

#[derive(Debug, Deserialize)]
struct Scene {
    anilist: Anilist,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    episode: Option<serde_json::Value>,
    #[serde(default)]
    image: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Anilist {
    Id(u64),
    Info {
        id: u64,
        #[serde(default)]
        title: Titles,
    },
}

#[derive(Debug, Default, Deserialize)]
struct Titles {
    english: Option<String>,
    romaji: Option<String>,
    native: Option<String>,
}

impl Anilist {
    fn id(&self) -> u64 {
        match self {
            Self::Id(id) | Self::Info { id, .. } => *id,
        }
    }

    fn title(&self) -> Option<&str> {
        let Self::Info { title, .. } = self else {
            return None;
        };
        [&title.english, &title.romaji, &title.native]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|t| !t.is_empty())
    }
}

fn episode_label(episode: Option<&serde_json::Value>) -> Option<String> {
    match episode? {
        serde_json::Value::Number(n) => Some(format!("Episode {n}")),
        serde_json::Value::String(s) if !s.is_empty() => Some(format!("Episode {s}")),
        _ => None,
    }
}

/// Parses a trace.moe reply. A non-empty `size` is appended to every
/// preview image URL.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] when the body is not a trace.moe reply
/// or carries an error message.
pub fn parse_results(body: &str, size: &str) -> Result<Vec<Candidate>, BackendError> {
    let response: Response = serde_json::from_str(body)
        .map_err(|e| BackendError::Backend(format!("TraceMoe returned invalid JSON: {e}")))?;
    if !response.error.is_empty() {
        return Err(BackendError::Backend(format!("TraceMoe error: {}", response.error)));
    }

    Ok(response
        .result
        .into_iter()
        .map(|scene| {
            let url = format!("https://anilist.co/anime/{}", scene.anilist.id());
            let title = scene
                .anilist
                .title()
                .map(str::to_owned)
                .unwrap_or_else(|| scene.filename.clone());
            let text = match episode_label(scene.episode.as_ref()) {
                Some(ep) => format!("{title} ({ep})"),
                None => title,
            };
            let thumbnail = if size.is_empty() || scene.image.is_empty() {
                scene.image
            } else {
                format!("{}&size={size}", scene.image)
            };
            Candidate::new(url, thumbnail, text)
        })
        .collect())
}

/// Runs one trace.moe search.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] on transport or API failure.
pub async fn search(ctx: &EngineContext, input: &SearchInput) -> Result<Harvest, BackendError> {
    let cfg = &ctx.config.tracemoe;
    let engine = ImageEngine::TraceMoe;
    let limit = engine.candidate_limit(&ctx.config);
    tracing::info!(engine = engine.name(), "searching");

    let mut url = format!("{}/search?anilistInfo", cfg.api_url.trim_end_matches('/'));
    if cfg.cut_borders {
        url.push_str("&cutBorders");
    }
    let (mime, _) = upload_meta(&input.bytes);
    let body = http::send(
        ctx.client
            .post(&url)
            .header(CONTENT_TYPE, mime)
            .body(input.bytes.clone()),
        engine.name(),
    )
    .await?
    .text()
    .await
    .map_err(|e| BackendError::Backend(format!("TraceMoe response read failed: {e}")))?;

    let candidates = parse_results(&body, &cfg.size)?;
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
