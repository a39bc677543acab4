//! Bluesky post previews, from `bsky.app` links or `at://` URIs.
//!
//! The whole parent chain is fetched in one thread request and rendered
//! oldest first.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};
use scry_core::{BackendError, Link, Task};

use super::format::process_num;
use super::{cached_regex, Preview, PreviewContext};
use crate::http;

/// Extraction patterns.
pub const LINK_PATTERNS: &[&str] = &[
    r"(?:https?://)?(bsky\.app/profile/[^/]+/post/[^/]+)",
    r"(at://[^/]+/app.bsky.feed.post/[^/]+)",
];

const LABEL: &str = "bluesky";
const TIME_FORMAT: &str = "%B %d, %Y at %I:%M %p";

fn web_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(
        &RE,
        r"(?:https?://)?bsky\.app/profile/(?P<handle>[^/]+)/post/(?P<rkey>[^/?#\s]+)",
    )
}

fn at_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(
        &RE,
        r"at://(?P<handle>[^/]+)/app\.bsky\.feed\.post/(?P<rkey>[^/?#\s]+)",
    )
}

/// `(handle, rkey)` of a post link in either form.
pub fn parse_post_link(link: &str) -> Option<(String, String)> {
    let caps = web_re().captures(link).or_else(|| at_re().captures(link))?;
    Some((caps["handle"].to_owned(), caps["rkey"].to_owned()))
}

#[derive(Debug, Deserialize)]
struct ThreadResponse {
    thread: Thread,
}

#[derive(Debug, Deserialize)]
struct Thread {
    post: Option<PostView>,
    parent: Option<Box<Thread>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    author: Author,
    #[serde(default)]
    record: Record,
    embed: Option<Value>,
    #[serde(default)]
    indexed_at: String,
    #[serde(default)]
    reply_count: i64,
    #[serde(default)]
    repost_count: i64,
    #[serde(default)]
    like_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Author {
    handle: String,
    display_name: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Record {
    #[serde(default)]
    text: String,
}

/// Posts from the root of the thread down to the requested post.
fn thread_chain(thread: Thread) -> Vec<PostView> {
    let mut chain = Vec::new();
    let mut node = Some(Box::new(thread));
    while let Some(current) = node {
        let Thread { post, parent } = *current;
        match post {
            Some(post) => chain.push(post),
            None => break,
        }
        node = parent;
    }
    chain.reverse();
    chain
}

fn format_time(indexed_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(indexed_at)
        .map(|t| t.with_timezone(&chrono::Local).format(TIME_FORMAT).to_string())
        .unwrap_or_else(|_| indexed_at.to_owned())
}

fn short_type(kind: &str) -> String {
    kind.trim_start_matches("app.bsky.embed.").to_owned()
}

async fn media_items(
    preview: &mut Preview,
    media: &Value,
    did: &str,
    rkey: &str,
) -> Result<Vec<Value>, BackendError> {
    let kind = media["$type"].as_str().unwrap_or_default();

    if kind.starts_with("app.bsky.embed.images") {
        let mut items = Vec::new();
        let images = media["images"].as_array().map(Vec::as_slice).unwrap_or_default();
        for (i, image) in images.iter().enumerate() {
            let Some(fullsize) = image["fullsize"].as_str() else {
                continue;
            };
            let id = format!("{rkey}-photo-{i}");
            let url = preview.cache(fullsize, Some(&[id.as_str()]), HeaderMap::new()).await?;
            items.push(json!({"type": "photo", "url": url}));
        }
        return Ok(items);
    }

    if kind.starts_with("app.bsky.embed.video") {
        if let Some(playlist) = media["playlist"].as_str() {
            preview.push_extra_media(playlist);
        }
        let thumbnail = match (media["thumbnail"].as_str(), media["video"]["ref"]["$link"].as_str()) {
            (Some(thumb), _) => Some(thumb.to_owned()),
            (None, Some(cid)) => Some(format!(
                "{}/watch/{}/{cid}/thumbnail.jpg",
                preview.context().config.bluesky.video_url.trim_end_matches('/'),
                urlencoding::encode(did)
            )),
            (None, None) => None,
        };
        let Some(thumbnail) = thumbnail else {
            return Ok(vec![json!({"type": "video", "url": null, "text": "Thumbnail not available"})]);
        };
        let id = format!("{rkey}-video-thumbnail");
        let url = preview.cache(&thumbnail, Some(&[id.as_str()]), HeaderMap::new()).await?;
        return Ok(vec![json!({"type": "video", "url": url, "text": "Video"})]);
    }

    Ok(vec![json!({"type": short_type(kind)})])
}

async fn embed_items(
    preview: &mut Preview,
    embed: &Value,
    did: &str,
    rkey: &str,
) -> Result<Vec<Value>, BackendError> {
    let kind = embed["$type"].as_str().unwrap_or_default();
    if kind.starts_with("app.bsky.embed.recordWithMedia") {
        media_items(preview, &embed["media"], did, rkey).await
    } else {
        media_items(preview, embed, did, rkey).await
    }
}

async fn post_document(preview: &mut Preview, post: PostView) -> Result<Value, BackendError> {
    let (did, rkey) = at_re()
        .captures(&post.uri)
        .map(|c| (c["handle"].to_owned(), c["rkey"].to_owned()))
        .ok_or_else(|| BackendError::Backend(format!("unexpected post URI: {}", post.uri)))?;

    let mut items: Vec<Value> = post
        .record
        .text
        .lines()
        .map(|line| json!({"type": "text", "text": line}))
        .collect();
    if let Some(embed) = &post.embed {
        items.extend(embed_items(preview, embed, &did, &rkey).await?);
    }

    let profile = match &post.author.avatar {
        Some(avatar) => {
            let id = format!("{}-avatar", post.author.handle);
            Value::String(preview.cache(avatar, Some(&[id.as_str()]), HeaderMap::new()).await?)
        }
        None => Value::Null,
    };
    let name = post
        .author
        .display_name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| post.author.handle.clone());

    Ok(json!({
        "author": {
            "profile": profile,
            "name": name,
            "handle": format!("@{}", post.author.handle),
        },
        "content_items": items,
        "time": format_time(&post.indexed_at),
        "comments": process_num(post.reply_count),
        "shares": process_num(post.repost_count),
        "likes": process_num(post.like_count),
    }))
}

fn auth_headers(bearer: &str) -> Result<HeaderMap, BackendError> {
    let mut headers = HeaderMap::new();
    if !bearer.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|e| BackendError::Config(format!("invalid bluesky bearer: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

async fn fetch(ctx: Arc<PreviewContext>, handle: String, rkey: String) -> Result<Preview, BackendError> {
    tracing::debug!(handle = %handle, rkey = %rkey, "got bluesky post");
    let mut preview = Preview::new(Arc::clone(&ctx));
    preview
        .set_url(format!("https://bsky.app/profile/{handle}/post/{rkey}"))
        .set_template("bluesky")
        .set_base_identifier([LABEL, handle.as_str(), rkey.as_str()]);

    let cfg = &ctx.config.bluesky;
    let at_uri = format!("at://{handle}/app.bsky.feed.post/{rkey}");
    let api = format!(
        "{}/xrpc/app.bsky.feed.getPostThread?uri={}&depth=10",
        cfg.api_url.trim_end_matches('/'),
        urlencoding::encode(&at_uri)
    );
    let headers = auth_headers(&cfg.bearer)?;
    let data = preview
        .cached_json(&["post.json"], http::fetch_json(&ctx.client, &api, headers))
        .await?;

    let response: ThreadResponse = serde_json::from_value(data)
        .map_err(|e| BackendError::Backend(format!("unexpected bluesky thread format: {e}")))?;
    let mut posts = Vec::new();
    for post in thread_chain(response.thread) {
        posts.push(post_document(&mut preview, post).await?);
    }
    if posts.is_empty() {
        return Err(BackendError::Backend(format!("bluesky post {at_uri} not found")));
    }
    preview.insert("posts", Value::Array(posts));
    tracing::info!(handle = %handle, rkey = %rkey, "bluesky post ready");
    Ok(preview)
}

/// Prepares the preview for a `bsky.app` link or `at://` post URI.
pub fn prepare(link: &Link, ctx: Arc<PreviewContext>) -> Task<Preview> {
    match parse_post_link(link.as_str()) {
        Some((handle, rkey)) => Task::pending(LABEL, fetch(ctx, handle, rkey)),
        None => Task::failed(
            LABEL,
            BackendError::InvalidInput(format!("invalid bluesky post URL: {link}")),
        ),
    }
}
