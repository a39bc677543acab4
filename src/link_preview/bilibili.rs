//! Bilibili video previews and `b23.tv` short links.
//!
//! Short links are resolved by walking their redirects until a video link
//! appears. Short links leading anywhere else (live rooms, articles) are
//! skipped silently.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Value};
use scry_core::{BackendError, Link, Task};

use super::format::{process_duration_ms, process_num};
use super::{cached_regex, Preview, PreviewContext, TIME_FORMAT};
use crate::http;

/// Extraction patterns.
pub const LINK_PATTERNS: &[&str] = &[
    r"((?:https?://)?(?:.*?\.)?b23\.tv/\w+)",
    r"((?:https?://)?(?:www\.)?bilibili\.com/video/(?:[Bb][Vv]\w{10}|[Aa][Vv]\d+))",
];

/// Hosts serving video pages.
pub const VIDEO_DOMAINS: [&str; 2] = ["bilibili.com", "www.bilibili.com"];

/// Hosts serving short links.
pub const SHORT_DOMAINS: [&str; 2] = ["b23.tv", "www.b23.tv"];

const LABEL: &str = "bilibili";
const MAX_REDIRECTS: usize = 10;

fn video_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(
        &RE,
        r"(?:https?://)?(?:www\.)?bilibili\.com/video/(?P<video_id>[Bb][Vv]\w{10}|[Aa][Vv]\d+)",
    )
}

fn short_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, r"(?:https?://)?(?:[^/]*?\.)?b23\.tv/(?P<short_id>\w+)")
}

/// A normalised video id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoId {
    /// `BV…` id, kept whole including the prefix.
    Bv(String),
    /// Numeric `av` id.
    Av(u64),
}

impl VideoId {
    /// Parses `BV1xx411c7mD` or `av170001` (prefix case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        let (prefix, rest) = raw.split_at_checked(2)?;
        if prefix.eq_ignore_ascii_case("bv") {
            Some(Self::Bv(format!("BV{rest}")))
        } else if prefix.eq_ignore_ascii_case("av") {
            rest.parse().ok().map(Self::Av)
        } else {
            None
        }
    }

    /// Finds a video id in a link.
    pub fn from_link(link: &str) -> Option<Self> {
        video_re()
            .captures(link)
            .and_then(|c| Self::parse(&c["video_id"]))
    }

    fn identifier(&self) -> String {
        match self {
            Self::Bv(id) => id.clone(),
            Self::Av(id) => format!("av{id}"),
        }
    }

    fn query(&self) -> String {
        match self {
            Self::Bv(id) => format!("bvid={id}"),
            Self::Av(id) => format!("aid={id}"),
        }
    }

    /// Canonical video page.
    pub fn page_url(&self) -> String {
        format!("https://www.bilibili.com/video/{}", self.identifier())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    title: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    pic: String,
    #[serde(default)]
    tname: String,
    #[serde(default)]
    ctime: i64,
    #[serde(default)]
    duration: u64,
    owner: Owner,
    stat: Stat,
}

#[derive(Debug, Deserialize)]
struct Owner {
    mid: u64,
    name: String,
    #[serde(default)]
    face: String,
}

#[derive(Debug, Deserialize)]
struct Stat {
    #[serde(default)]
    view: i64,
    #[serde(default)]
    danmaku: i64,
    #[serde(default)]
    reply: i64,
    #[serde(default)]
    favorite: i64,
    #[serde(default)]
    coin: i64,
    #[serde(default)]
    share: i64,
    #[serde(default)]
    like: i64,
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(http::random_user_agent()));
    headers
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.with_timezone(&chrono::Local).format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

fn parse_envelope(data: Value) -> Result<Video, BackendError> {
    let envelope: Envelope = serde_json::from_value(data)
        .map_err(|e| BackendError::Backend(format!("unexpected bilibili video format: {e}")))?;
    match envelope.data {
        Some(video) if envelope.code == 0 => Ok(video),
        _ => Err(BackendError::Backend(format!(
            "bilibili error {}: {}",
            envelope.code, envelope.message
        ))),
    }
}

async fn to_document(preview: &mut Preview, video: Video) -> Result<Value, BackendError> {
    let face_id = format!("{}-face", video.owner.mid);
    let profile = if video.owner.face.is_empty() {
        Value::Null
    } else {
        Value::String(
            preview
                .cache(&video.owner.face, Some(&[face_id.as_str()]), browser_headers())
                .await?,
        )
    };

    let mut items = Vec::new();
    if !video.pic.is_empty() {
        let pic = preview.cache(&video.pic, Some(&["pic"]), browser_headers()).await?;
        items.push(json!({"type": "photo", "url": pic}));
    }
    items.push(json!({"type": "title", "text": &video.title}));
    items.extend(video.desc.lines().map(|line| json!({"type": "text", "text": line})));

    Ok(json!({
        "title": video.title,
        "author": {
            "profile": profile,
            "name": video.owner.name,
            "subtext": video.tname,
        },
        "content_items": items,
        "time": format_timestamp(video.ctime),
        "duration": process_duration_ms(video.duration * 1_000),
        "views": process_num(video.stat.view),
        "danmaku": process_num(video.stat.danmaku),
        "comments": process_num(video.stat.reply),
        "favorites": process_num(video.stat.favorite),
        "coins": process_num(video.stat.coin),
        "shares": process_num(video.stat.share),
        "likes": process_num(video.stat.like),
    }))
}

async fn fetch_video(ctx: Arc<PreviewContext>, id: VideoId) -> Result<Preview, BackendError> {
    tracing::debug!(video = %id.identifier(), "got bilibili video");
    let mut preview = Preview::new(Arc::clone(&ctx));
    let identifier = id.identifier();
    preview
        .set_url(id.page_url())
        .set_template("bilibili")
        .set_base_identifier([LABEL, identifier.as_str()]);

    let api = format!(
        "{}/x/web-interface/view?{}",
        ctx.config.bilibili.api_url.trim_end_matches('/'),
        id.query()
    );
    let request = async {
        let data: Value = http::fetch_json(&ctx.client, &api, browser_headers()).await?;
        parse_envelope(data.clone())?;
        Ok::<Value, BackendError>(data)
    };
    let data = preview.cached_json(&["video.json"], request).await?;

    let post = to_document(&mut preview, parse_envelope(data)?).await?;
    preview.insert("post", post);
    tracing::info!(video = %identifier, "bilibili video ready");
    Ok(preview)
}

/// Follows redirects from `start` until a video link shows up.
///
/// # Errors
///
/// - [`BackendError::Skip`] if the chain ends somewhere other than a video.
/// - [`BackendError::Backend`] on transport failure or a redirect loop.
pub async fn resolve_short(start: &str) -> Result<VideoId, BackendError> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(20))
        .user_agent(http::random_user_agent())
        .build()
        .map_err(|e| BackendError::Backend(format!("failed to build HTTP client: {e}")))?;

    let mut current = url::Url::parse(start)
        .map_err(|e| BackendError::InvalidInput(format!("invalid short link {start}: {e}")))?;
    for _ in 0..MAX_REDIRECTS {
        if let Some(id) = VideoId::from_link(current.as_str()) {
            return Ok(id);
        }
        let response = client
            .get(current.clone())
            .send()
            .await
            .map_err(|e| BackendError::Backend(format!("short link request failed: {}", e.without_url())))?;
        let next = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|_| response.status().is_redirection())
            .and_then(|loc| current.join(loc).ok());
        match next {
            Some(next) => current = next,
            None => {
                return Err(BackendError::Skip(format!(
                    "unsupported bilibili link: {current}"
                )))
            }
        }
    }
    Err(BackendError::Backend(format!("too many redirects from {start}")))
}

async fn fetch_short(ctx: Arc<PreviewContext>, short_id: String) -> Result<Preview, BackendError> {
    tracing::debug!(short_id = %short_id, "got bilibili short link");
    let start = format!(
        "{}/{short_id}",
        ctx.config.bilibili.short_url.trim_end_matches('/')
    );
    let id = resolve_short(&start).await?;
    fetch_video(ctx, id).await
}

/// Prepares the preview for a video link.
pub fn prepare_video(link: &Link, ctx: Arc<PreviewContext>) -> Task<Preview> {
    match VideoId::from_link(link.as_str()) {
        Some(id) => Task::pending(LABEL, fetch_video(ctx, id)),
        None => Task::failed(
            LABEL,
            BackendError::InvalidInput(format!("invalid bilibili video URL: {link}")),
        ),
    }
}

/// Prepares the preview for a `b23.tv` short link.
pub fn prepare_short(link: &Link, ctx: Arc<PreviewContext>) -> Task<Preview> {
    match short_re().captures(link.as_str()) {
        Some(caps) => Task::pending(LABEL, fetch_short(ctx, caps["short_id"].to_owned())),
        None => Task::failed(
            LABEL,
            BackendError::InvalidInput(format!("invalid bilibili short URL: {link}")),
        ),
    }
}
