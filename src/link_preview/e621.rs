//! e621 post previews.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use base64::Engine as _;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Value};
use scry_core::{BackendError, Link, Task};

use super::format::process_num;
use super::{cached_regex, Preview, PreviewContext, TIME_FORMAT};
use crate::config::E621Config;
use crate::http;

/// Extraction patterns.
pub const LINK_PATTERNS: &[&str] = &[r"((?:https?://)?e621\.net/posts/\d+)"];

const LABEL: &str = "e621";

fn post_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, r"(?:https?://)?e621\.net/posts/(?P<post_id>\d+)")
}

#[derive(Debug, Deserialize)]
struct Envelope {
    post: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: u64,
    rating: String,
    score: Score,
    #[serde(default)]
    flags: Flags,
    #[serde(default)]
    sample: Sample,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: BTreeMap<String, Vec<String>>,
    created_at: String,
    #[serde(default)]
    comment_count: i64,
    #[serde(default)]
    fav_count: i64,
}

#[derive(Debug, Deserialize)]
struct Score {
    up: i64,
    down: i64,
    total: i64,
}

#[derive(Debug, Default, Deserialize)]
struct Flags {
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Sample {
    url: Option<String>,
}

fn rating_name(rating: &str) -> &str {
    match rating {
        "s" => "Safe",
        "q" => "Questionable",
        "e" => "Explicit",
        other => other,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn tag_items(tags: &BTreeMap<String, Vec<String>>) -> Vec<Value> {
    tags.iter()
        .filter(|(category, tags)| category.as_str() != "invalid" && !tags.is_empty())
        .flat_map(|(category, tags)| {
            [
                json!({"type": "text", "text": capitalize(category)}),
                json!({"type": "hashtag", "tags": tags}),
            ]
        })
        .collect()
}

/// Request headers carrying the configured credentials.
///
/// # Errors
///
/// Returns [`BackendError::Config`] if the credentials contain characters
/// not allowed in headers.
pub fn build_headers(cfg: &E621Config) -> Result<HeaderMap, BackendError> {
    let invalid = |e: reqwest::header::InvalidHeaderValue| {
        BackendError::Config(format!("invalid e621 credentials: {e}"))
    };
    let auth = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", cfg.username, cfg.api_key));

    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("LinkPreview/0.1.0 (user {} on e621)", cfg.username))
            .map_err(invalid)?,
    );
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {auth}")).map_err(invalid)?,
    );
    Ok(headers)
}

fn format_time(created_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(created_at)
        .map(|t| t.with_timezone(&chrono::Local).format(TIME_FORMAT).to_string())
        .unwrap_or_else(|_| created_at.to_owned())
}

async fn to_document(preview: &mut Preview, data: Value, headers: &HeaderMap) -> Result<Value, BackendError> {
    let Envelope { post } = serde_json::from_value(data)
        .map_err(|e| BackendError::Backend(format!("unexpected e621 post format: {e}")))?;

    let mut items = Vec::new();
    if let Some(sample) = post.sample.url.as_deref() {
        let url = preview.cache(sample, Some(&["photo"]), headers.clone()).await?;
        items.push(json!({"type": "photo", "url": url}));
    }
    items.extend(
        post.description
            .lines()
            .map(|line| json!({"type": "text", "text": line})),
    );
    items.push(json!({"type": "hr"}));
    items.extend(tag_items(&post.tags));

    Ok(json!({
        "id": post.id,
        "rating": rating_name(&post.rating),
        "score": post.score.total,
        "deleted": post.flags.deleted,
        "content_items": items,
        "time": format_time(&post.created_at),
        "comments": process_num(post.comment_count),
        "likes": process_num(post.fav_count),
        "up_votes": process_num(post.score.up),
        "down_votes": process_num(post.score.down),
    }))
}

async fn fetch(ctx: Arc<PreviewContext>, post_id: String) -> Result<Preview, BackendError> {
    tracing::debug!(post_id = %post_id, "got e621 post");
    let mut preview = Preview::new(Arc::clone(&ctx));
    preview
        .set_url(format!("https://e621.net/posts/{post_id}"))
        .set_template("e621")
        .set_base_identifier([LABEL, post_id.as_str()]);

    let headers = build_headers(&ctx.config.e621)?;
    let api = format!(
        "{}/posts/{post_id}.json",
        ctx.config.e621.api_url.trim_end_matches('/')
    );
    let data = preview
        .cached_json(&["post.json"], http::fetch_json(&ctx.client, &api, headers.clone()))
        .await?;

    let post = to_document(&mut preview, data, &headers).await?;
    preview.insert("post", post);
    tracing::info!(post_id = %post_id, "e621 post ready");
    Ok(preview)
}

/// Prepares the preview for an e621 post link.
pub fn prepare(link: &Link, ctx: Arc<PreviewContext>) -> Task<Preview> {
    match post_re().captures(link.as_str()).and_then(|c| c.name("post_id")) {
        Some(id) => Task::pending(LABEL, fetch(ctx, id.as_str().to_owned())),
        None => Task::failed(
            LABEL,
            BackendError::InvalidInput(format!("invalid e621 post URL: {link}")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkPreviewConfig;
    use crate::link_preview::test_support::context;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post_json(sample: &str) -> Value {
        json!({"post": {
            "id": 42,
            "created_at": "2024-03-01T10:20:30.123-05:00",
            "rating": "s",
            "score": {"up": 1500, "down": -3, "total": 1497},
            "flags": {"deleted": false},
            "sample": {"url": sample},
            "description": "line one\nline two",
            "tags": {"general": ["sky", "cloud"], "artist": ["someone"], "invalid": ["x"], "lore": []},
            "comment_count": 2,
            "fav_count": 12000
        }})
    }

    #[test]
    fn headers_carry_basic_auth() {
        let cfg = E621Config {
            username: "alice".into(),
            api_key: "key".into(),
            ..Default::default()
        };
        let headers = build_headers(&cfg).expect("headers");
        assert_eq!(headers[AUTHORIZATION], "Basic YWxpY2U6a2V5");
        assert_eq!(headers[USER_AGENT], "LinkPreview/0.1.0 (user alice on e621)");
    }

    #[test]
    fn tags_skip_invalid_and_empty_categories() {
        let tags: BTreeMap<String, Vec<String>> = serde_json::from_value(json!({
            "general": ["sky"], "invalid": ["x"], "lore": []
        }))
        .expect("tags");
        let items = tag_items(&tags);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["text"], "General");
    }

    #[test]
    fn non_post_link_fails_at_execution() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = Link::parse("https://e621.net/pools/1").expect("link");
        let task = prepare(&link, context(dir.path(), LinkPreviewConfig::default()));
        assert!(task.is_failed());
    }

    #[tokio::test]
    async fn fetches_post_and_caches_sample() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/42.json"))
            .and(header("authorization", "Basic dTpr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(post_json(&format!(
                "{}/data/sample.jpg",
                server.uri()
            ))))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/sample.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = LinkPreviewConfig::default();
        config.e621.api_url = server.uri();
        config.e621.username = "u".into();
        config.e621.api_key = "k".into();
        let ctx = context(dir.path(), config);

        let link = Link::parse("e621.net/posts/42").expect("link");
        let preview = prepare(&link, Arc::clone(&ctx)).execute().await.expect("preview");
        assert_eq!(preview.url(), Some("https://e621.net/posts/42"));
        assert_eq!(preview.template(), Some("e621"));

        let post = &preview.data()["post"];
        assert_eq!(post["rating"], "Safe");
        assert_eq!(post["score"], 1497);
        assert_eq!(post["likes"], "12.0K");
        assert_eq!(post["up_votes"], "1.5K");
        assert_eq!(post["content_items"][0]["type"], "photo");
        assert_eq!(post["content_items"][1]["text"], "line one");
        assert!(dir.path().join("e621/42/post.json").is_file());
        assert!(dir.path().join("e621/42/photo").is_file());

        // Second run is served from cache; the API mock expects one call.
        let again = prepare(&link, ctx).execute().await.expect("preview");
        assert!(again.data()["_meta"]["cache_time"].is_string());
    }
}
