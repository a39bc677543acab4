//! IQDB engine: multipart upload, HTML results page scraped with `scraper`.

use scraper::{ElementRef, Html, Selector};
use scry_core::{BackendError, Harvest};
use url::Url;

use super::image_part;
use crate::http;
use crate::image_search::collect::{collect, Candidate};
use crate::image_search::{EngineContext, ImageEngine, SearchInput};

/// Match blocks shown on one results page.
pub const PAGE_SIZE: usize = 16;

fn selector(css: &str) -> Result<Selector, BackendError> {
    Selector::parse(css).map_err(|e| BackendError::Backend(format!("selector parse error: {e:?}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

/// Turns a possibly relative or protocol-relative reference absolute.
fn absolutize(base: Option<&Url>, href: &str) -> String {
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_owned(),
    }
}

/// Parses an IQDB results page.
///
/// The query image block and "No relevant matches" blocks are skipped.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] if the page carries an IQDB error
/// message instead of results.
pub fn parse_results(html: &str, endpoint: &str) -> Result<Vec<Candidate>, BackendError> {
    let document = Html::parse_document(html);
    let base = Url::parse(endpoint).ok();

    let error_sel = selector(".err")?;
    if let Some(err) = document.select(&error_sel).next() {
        return Err(BackendError::Backend(format!("IQDB error: {}", text_of(err))));
    }

    let block_sel = selector("#pages > div")?;
    let heading_sel = selector("th")?;
    let link_sel = selector("td.image a")?;
    let img_sel = selector("td.image img")?;

    let mut results = Vec::new();
    for block in document.select(&block_sel) {
        let heading = block.select(&heading_sel).next().map(text_of).unwrap_or_default();
        if heading.contains("Your image") || heading.contains("No relevant matches") {
            continue;
        }

        let Some(href) = block.select(&link_sel).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        let img = block.select(&img_sel).next();
        let thumbnail = img
            .and_then(|i| i.value().attr("src"))
            .map(|src| absolutize(base.as_ref(), src))
            .unwrap_or_default();
        let text = img
            .and_then(|i| i.value().attr("alt").or_else(|| i.value().attr("title")))
            .map(str::to_owned)
            .filter(|t| !t.is_empty())
            .unwrap_or(heading);

        results.push(Candidate::new(absolutize(base.as_ref(), href), thumbnail, text));
    }
    Ok(results)
}

/// Runs one IQDB search against the 2D or 3D endpoint.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] on transport failure or an IQDB error page.
pub async fn search(ctx: &EngineContext, input: &SearchInput) -> Result<Harvest, BackendError> {
    let engine = ImageEngine::Iqdb;
    let endpoint = ctx.config.iqdb.active_endpoint();
    let limit = engine.candidate_limit(&ctx.config);
    tracing::info!(engine = engine.name(), endpoint, "searching");

    let form = reqwest::multipart::Form::new().part("file", image_part(&input.bytes)?);
    let html = http::send(ctx.client.post(endpoint).multipart(form), engine.name())
        .await?
        .text()
        .await
        .map_err(|e| BackendError::Backend(format!("IQDB response read failed: {e}")))?;

    let candidates = parse_results(&html, endpoint)?;
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
