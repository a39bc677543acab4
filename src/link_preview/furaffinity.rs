//! FurAffinity submission previews, scraped from the submission page.
//!
//! Mature submissions are only visible to a logged-in session, so the
//! configured `a`/`b` cookies are sent with the page and image requests.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use scry_core::{BackendError, Link, Task};
use url::Url;

use super::format::process_value;
use super::{cached_regex, Preview, PreviewContext};
use crate::config::FurAffinityConfig;
use crate::http;

/// Extraction patterns.
pub const LINK_PATTERNS: &[&str] = &[r"((?:https?://)?(?:www\.)?furaffinity\.net/view/\d+)"];

/// Hosts routed to this handler.
pub const DOMAINS: [&str; 2] = ["furaffinity.net", "www.furaffinity.net"];

const LABEL: &str = "furaffinity";
const POSTED_FORMAT: &str = "%b %d, %Y %I:%M %p";
const MISSING: &str = "N/A";

fn submission_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(
        &RE,
        r"(?:https?://)?(?:www\.)?furaffinity\.net/view/(?P<submission>\d+)",
    )
}

fn selector(css: &str) -> Result<Selector, BackendError> {
    Selector::parse(css).map_err(|e| BackendError::Backend(format!("selector parse error: {e:?}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

/// Fields scraped from a submission page.
#[derive(Debug, Default, PartialEq)]
struct Submission {
    photo: Option<String>,
    avatar: Option<String>,
    author: String,
    category: String,
    kind: String,
    title: String,
    description: Vec<String>,
    tags: Vec<String>,
    posted: String,
    views: String,
    comments: String,
    favorites: String,
    rating: String,
}

/// Description text with the footer and bbcode blocks left out and `<br>`
/// turned into line breaks.
fn description_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let el = child.value();
        if el.name() == "br" {
            out.push('\n');
            continue;
        }
        let skipped = el.classes().any(|c| c == "submission-footer")
            || (el.name() == "code" && el.classes().any(|c| c == "bbcode"));
        if !skipped {
            description_text(child, out);
        }
    }
}

fn format_posted(posted: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(posted, POSTED_FORMAT)
        .map(|t| t.format(POSTED_FORMAT).to_string())
        .unwrap_or_else(|_| posted.to_owned())
}

fn absolute(base: Option<&Url>, src: &str) -> String {
    match base.and_then(|b| b.join(src).ok()) {
        Some(url) => url.to_string(),
        None => src.to_owned(),
    }
}

/// Scrapes a submission page. `base` resolves relative image references.
fn parse_submission(html: &str, base: Option<&Url>) -> Result<Submission, BackendError> {
    let document = Html::parse_document(html);
    let first_text = |css: &str| -> Result<String, BackendError> {
        let sel = selector(css)?;
        Ok(document
            .select(&sel)
            .next()
            .map(text_of)
            .unwrap_or_else(|| MISSING.to_owned()))
    };
    let first_attr = |css: &str, attr: &str| -> Result<Option<String>, BackendError> {
        let sel = selector(css)?;
        Ok(document
            .select(&sel)
            .next()
            .and_then(|e| e.value().attr(attr))
            .map(str::to_owned))
    };

    let tags_sel = selector("section.tags-row span.tags")?;
    let tags = document
        .select(&tags_sel)
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();

    let description_sel = selector("div.submission-description")?;
    let description = match document.select(&description_sel).next() {
        Some(element) => {
            let mut text = String::new();
            description_text(element, &mut text);
            text.trim().lines().map(|l| l.trim().to_owned()).collect()
        }
        None => Vec::new(),
    };

    Ok(Submission {
        photo: first_attr("img#submissionImg", "src")?.map(|src| absolute(base, &src)),
        avatar: first_attr("div.submission-id-avatar a img", "src")?.map(|src| absolute(base, &src)),
        author: first_text("div.submission-id-sub-container a strong")?,
        category: first_text("span.category-name")?,
        kind: first_text("span.type-name")?,
        title: first_text("div.submission-title p")?,
        description,
        tags,
        posted: first_attr("span.popup_date", "title")?
            .map(|t| format_posted(&t))
            .unwrap_or_else(|| MISSING.to_owned()),
        views: first_text("div.views span")?,
        comments: first_text("div.comments span")?,
        favorites: first_text("div.favorites span")?,
        rating: first_text("div.rating span")?,
    })
}

fn is_submission_page(html: &str) -> bool {
    let Ok(sel) = selector("div.submission-title") else {
        return false;
    };
    Html::parse_document(html).select(&sel).next().is_some()
}

/// `Cookie` header carrying the configured session, if any.
///
/// # Errors
///
/// Returns [`BackendError::Config`] if the cookies contain characters not
/// allowed in headers.
pub fn cookie_headers(cfg: &FurAffinityConfig) -> Result<HeaderMap, BackendError> {
    let mut headers = HeaderMap::new();
    if cfg.cookie_a.is_empty() && cfg.cookie_b.is_empty() {
        return Ok(headers);
    }
    let value = HeaderValue::from_str(&format!("a={}; b={}", cfg.cookie_a, cfg.cookie_b))
        .map_err(|e| BackendError::Config(format!("invalid furaffinity cookies: {e}")))?;
    headers.insert(COOKIE, value);
    Ok(headers)
}

fn count(text: &str) -> String {
    process_value(&Value::String(text.replace(',', "")))
}

async fn to_document(
    preview: &mut Preview,
    submission: Submission,
    headers: &HeaderMap,
) -> Result<Value, BackendError> {
    let mut items = Vec::new();
    if let Some(photo) = submission.photo.as_deref() {
        let url = preview.cache(photo, Some(&["photo"]), headers.clone()).await?;
        items.push(json!({"type": "photo", "url": url}));
    }
    if !submission.tags.is_empty() {
        items.push(json!({"type": "hashtag", "tags": submission.tags}));
    }
    items.push(json!({"type": "title", "text": submission.title}));
    items.extend(
        submission
            .description
            .iter()
            .map(|line| json!({"type": "text", "text": line})),
    );

    let profile = match submission.avatar.as_deref() {
        Some(avatar) => {
            let id = format!("{}-avatar", submission.author);
            Value::String(preview.cache(avatar, Some(&[id.as_str()]), headers.clone()).await?)
        }
        None => Value::Null,
    };

    Ok(json!({
        "author": {
            "profile": profile,
            "name": submission.author,
            "handle": format!("{} / {}", submission.category, submission.kind),
        },
        "content_items": items,
        "time": submission.posted,
        "view": count(&submission.views),
        "comments": count(&submission.comments),
        "likes": count(&submission.favorites),
        "rating": submission.rating,
    }))
}

async fn fetch(ctx: Arc<PreviewContext>, submission_id: String) -> Result<Preview, BackendError> {
    tracing::debug!(submission = %submission_id, "got furaffinity submission");
    let mut preview = Preview::new(Arc::clone(&ctx));
    preview
        .set_url(format!("https://www.furaffinity.net/view/{submission_id}"))
        .set_template("furaffinity")
        .set_base_identifier([LABEL, submission_id.as_str()]);

    let cfg = &ctx.config.furaffinity;
    let headers = cookie_headers(cfg)?;
    let page = format!("{}/view/{submission_id}/", cfg.base_url.trim_end_matches('/'));
    let request = async {
        let html = http::fetch_text(&ctx.client, &page, headers.clone()).await?;
        if !is_submission_page(&html) {
            return Err(BackendError::Backend(format!(
                "furaffinity submission {submission_id} is not available"
            )));
        }
        Ok::<String, BackendError>(html)
    };
    let html = preview.cached_text(&["submission.html"], request).await?;

    let base = Url::parse(&cfg.base_url).ok();
    let submission = parse_submission(&html, base.as_ref())?;
    let post = to_document(&mut preview, submission, &headers).await?;
    preview.insert("posts", Value::Array(vec![post]));
    tracing::info!(submission = %submission_id, "furaffinity submission ready");
    Ok(preview)
}

/// Prepares the preview for a FurAffinity submission link.
pub fn prepare(link: &Link, ctx: Arc<PreviewContext>) -> Task<Preview> {
    match submission_re().captures(link.as_str()).and_then(|c| c.name("submission")) {
        Some(id) => Task::pending(LABEL, fetch(ctx, id.as_str().to_owned())),
        None => Task::failed(
            LABEL,
            BackendError::InvalidInput(format!("invalid furaffinity submission URL: {link}")),
        ),
    }
}
