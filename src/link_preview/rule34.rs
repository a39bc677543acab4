//! Rule34 post previews.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use scry_core::{BackendError, Link, Task};

use super::{cached_regex, Preview, PreviewContext, TIME_FORMAT};
use crate::http;

/// Extraction patterns.
pub const LINK_PATTERNS: &[&str] =
    &[r"((?:https?://)?rule34\.xxx/index\.php\?[&=a-z\d]*id=\d+[&=a-z\d]*)"];

const LABEL: &str = "rule34";

fn post_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(
        &RE,
        r"(?:https?://)?rule34\.xxx/index\.php\?[&=a-z\d]*id=(?P<post_id>\d+)[&=a-z\d]*",
    )
}

#[derive(Debug, Deserialize)]
struct Post {
    id: u64,
    #[serde(default)]
    rating: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    sample_url: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    change: i64,
    #[serde(default)]
    comment_count: i64,
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.with_timezone(&chrono::Local).format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

async fn to_document(preview: &mut Preview, data: Value) -> Result<Value, BackendError> {
    let posts: Vec<Post> = serde_json::from_value(data)
        .map_err(|e| BackendError::Backend(format!("unexpected rule34 post format: {e}")))?;
    let Some(post) = posts.into_iter().next() else {
        return Err(BackendError::Backend("rule34 post not found".into()));
    };

    let mut items = Vec::new();
    if !post.sample_url.is_empty() {
        let url = preview
            .cache(&post.sample_url, Some(&["photo"]), HeaderMap::new())
            .await?;
        items.push(json!({"type": "photo", "url": url}));
    }
    items.push(json!({"type": "hashtag", "tags": post.tags.split_whitespace().collect::<Vec<_>>()}));

    Ok(json!({
        "id": post.id,
        "rating": title_case(&post.rating),
        "score": post.score,
        "deleted": post.status != "active",
        "content_items": items,
        "time": format_timestamp(post.change),
        "comments": post.comment_count,
    }))
}

async fn fetch(ctx: Arc<PreviewContext>, post_id: String) -> Result<Preview, BackendError> {
    tracing::debug!(post_id = %post_id, "got rule34 post");
    let mut preview = Preview::new(Arc::clone(&ctx));
    preview
        .set_url(format!(
            "https://rule34.xxx/index.php?page=post&s=view&id={post_id}"
        ))
        .set_template("rule34")
        .set_base_identifier([LABEL, post_id.as_str()]);

    let api = format!(
        "{}/index.php?page=dapi&s=post&q=index&json=1&id={post_id}",
        ctx.config.rule34.api_url.trim_end_matches('/')
    );
    let request = async {
        let data: Value = http::fetch_json(&ctx.client, &api, HeaderMap::new()).await?;
        if data.as_array().is_some_and(Vec::is_empty) {
            return Err(BackendError::Backend("rule34 post not found".into()));
        }
        Ok::<Value, BackendError>(data)
    };
    let data = preview.cached_json(&["post.json"], request).await?;

    let post = to_document(&mut preview, data).await?;
    preview.insert("post", post);
    tracing::info!(post_id = %post_id, "rule34 post ready");
    Ok(preview)
}

/// Prepares the preview for a Rule34 post link.
pub fn prepare(link: &Link, ctx: Arc<PreviewContext>) -> Task<Preview> {
    match post_re().captures(link.as_str()).and_then(|c| c.name("post_id")) {
        Some(id) => Task::pending(LABEL, fetch(ctx, id.as_str().to_owned())),
        None => Task::failed(
            LABEL,
            BackendError::InvalidInput(format!("invalid Rule34 post URL: {link}")),
        ),
    }
}
