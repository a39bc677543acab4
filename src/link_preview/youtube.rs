//! YouTube video previews through the Data API v3.
//!
//! The video and its channel are fetched separately and cached as
//! `video.json` and `channel.json`.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use scry_core::{BackendError, Link, Task};

use super::format::process_value;
use super::{cached_regex, Preview, PreviewContext, TIME_FORMAT};
use crate::http;

/// Extraction patterns.
pub const LINK_PATTERNS: &[&str] = &[
    r"((?:https?://)?(?:www\.)?youtu\.be/[\w-]+)",
    r"((?:https?://)?(?:\w+\.)?(?:youtube\.com|youtu\.be)/watch\?v=[\w-]+)",
];

/// Hosts routed to this handler.
pub const DOMAINS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "youtu.be",
    "www.youtu.be",
];

const LABEL: &str = "youtube";

fn watch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(
        &RE,
        r"(?:https?://)?(?:\w+\.)?(?:youtube\.com|youtu\.be)/watch\?v=(?P<video_id>[\w-]+)",
    )
}

fn short_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, r"(?:https?://)?(?:www\.)?youtu\.be/(?P<video_id>[\w-]+)")
}

/// Video ID of a `watch?v=` or `youtu.be/` link.
pub fn parse_video_id(link: &str) -> Option<String> {
    let caps = watch_re().captures(link).or_else(|| short_re().captures(link))?;
    Some(caps["video_id"].to_owned())
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Listing<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Video {
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: Statistics,
    #[serde(default)]
    status: Status,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    channel_id: String,
    #[serde(default)]
    published_at: String,
    #[serde(default)]
    thumbnails: BTreeMap<String, Thumbnail>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: Statistics,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
    #[serde(default)]
    thumbnails: BTreeMap<String, Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Counters arrive as decimal strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    #[serde(default)]
    view_count: Value,
    #[serde(default)]
    like_count: Value,
    #[serde(default)]
    comment_count: Value,
    #[serde(default)]
    subscriber_count: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    privacy_status: Option<String>,
}

const VIDEO_SIZES: &[&str] = &["maxres", "standard", "high", "medium", "default"];
const CHANNEL_SIZES: &[&str] = &["high", "medium", "default"];

/// Largest available thumbnail as `(size, url)`.
fn best_thumbnail<'a>(
    thumbnails: &'a BTreeMap<String, Thumbnail>,
    sizes: &[&'static str],
) -> Option<(&'static str, &'a str)> {
    sizes
        .iter()
        .find_map(|size| thumbnails.get(*size).map(|t| (*size, t.url.as_str())))
}

fn format_time(published_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(published_at)
        .map(|t| t.with_timezone(&chrono::Local).format(TIME_FORMAT).to_string())
        .unwrap_or_else(|_| published_at.to_owned())
}

fn first_item<T: serde::de::DeserializeOwned>(data: Value, what: &str) -> Result<T, BackendError> {
    let listing: Listing<T> = serde_json::from_value(data)
        .map_err(|e| BackendError::Backend(format!("unexpected youtube {what} format: {e}")))?;
    listing
        .items
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Backend(format!("youtube {what} not found")))
}

/// GETs a Data API listing, failing before it is cached when it is empty.
async fn fetch_listing(client: &reqwest::Client, url: &str, what: &str) -> Result<Value, BackendError> {
    let data: Value = http::fetch_json(client, url, HeaderMap::new()).await?;
    if data["items"].as_array().is_none_or(Vec::is_empty) {
        return Err(BackendError::Backend(format!("youtube {what} not found")));
    }
    Ok(data)
}

async fn to_document(preview: &mut Preview, video: Video, channel: Channel) -> Result<Value, BackendError> {
    let profile = match best_thumbnail(&channel.snippet.thumbnails, CHANNEL_SIZES) {
        Some((size, url)) => {
            let id = format!("channel-{}-thumbnail-{size}", channel.id);
            Value::String(preview.cache(url, Some(&[id.as_str()]), HeaderMap::new()).await?)
        }
        None => Value::Null,
    };

    let snippet = video.snippet;
    let mut items = Vec::new();
    if let Some((size, url)) = best_thumbnail(&snippet.thumbnails, VIDEO_SIZES) {
        let id = format!("video-thumbnail-{size}");
        let url = preview.cache(url, Some(&[id.as_str()]), HeaderMap::new()).await?;
        items.push(json!({"type": "photo", "url": url}));
    }
    items.push(json!({"type": "title", "text": snippet.title.clone()}));
    items.extend(
        snippet
            .description
            .lines()
            .map(|line| json!({"type": "text", "text": line})),
    );
    if let Some(tags) = snippet.tags.filter(|t| !t.is_empty()) {
        items.push(json!({"type": "hashtag", "tags": tags}));
    }

    let locked = video
        .status
        .privacy_status
        .is_some_and(|status| status != "public");

    Ok(json!({
        "title": snippet.title,
        "author": {
            "profile": profile,
            "name": channel.snippet.title,
            "subtext": format!("{} subscribers", process_value(&channel.statistics.subscriber_count)),
        },
        "content_items": items,
        "locked": locked,
        "time": format_time(&snippet.published_at),
        "views": process_value(&video.statistics.view_count),
        "likes": process_value(&video.statistics.like_count),
        "comments": process_value(&video.statistics.comment_count),
    }))
}

async fn fetch(ctx: Arc<PreviewContext>, video_id: String) -> Result<Preview, BackendError> {
    tracing::debug!(video_id = %video_id, "got youtube video");
    let mut preview = Preview::new(Arc::clone(&ctx));
    preview
        .set_url(format!("https://www.youtube.com/watch?v={video_id}"))
        .set_template("youtube")
        .set_base_identifier([LABEL, video_id.as_str()]);

    let cfg = &ctx.config.youtube;
    let root = cfg.api_url.trim_end_matches('/');
    let key = urlencoding::encode(&cfg.api_key);

    let video_api = format!(
        "{root}/videos?part=snippet,statistics,status&id={}&key={key}",
        urlencoding::encode(&video_id)
    );
    let data = preview
        .cached_json(&["video.json"], fetch_listing(&ctx.client, &video_api, "video"))
        .await?;
    let video: Video = first_item(data, "video")?;

    let channel_api = format!(
        "{root}/channels?part=snippet,statistics&id={}&key={key}",
        urlencoding::encode(&video.snippet.channel_id)
    );
    let data = preview
        .cached_json(&["channel.json"], fetch_listing(&ctx.client, &channel_api, "channel"))
        .await?;
    let channel: Channel = first_item(data, "channel")?;

    let post = to_document(&mut preview, video, channel).await?;
    preview.insert("post", post);
    tracing::info!(video_id = %video_id, "youtube video ready");
    Ok(preview)
}

/// Prepares the preview for a YouTube video link.
pub fn prepare(link: &Link, ctx: Arc<PreviewContext>) -> Task<Preview> {
    match parse_video_id(link.as_str()) {
        Some(video_id) => Task::pending(LABEL, fetch(ctx, video_id)),
        None => Task::failed(
            LABEL,
            BackendError::InvalidInput(format!("invalid youtube video URL: {link}")),
        ),
    }
}
