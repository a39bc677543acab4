//! Shared HTTP client and fetch helpers.
//!
//! Every backend goes through these helpers so transport failures surface
//! uniformly as [`BackendError::Backend`] with the failing URL's host in the
//! message, never its query string (which may carry API keys).

use std::time::Duration;

use bytes::Bytes;
use rand::seq::SliceRandom;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use scry_core::BackendError;

use crate::config::HttpConfig;
use crate::error::ScryError;

/// Realistic browser User-Agent strings, rotated per client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Build the shared [`reqwest::Client`].
///
/// The client has:
/// - Timeout from config
/// - Random User-Agent from the rotation list (or the configured one)
/// - Redirects followed up to 10 hops (short links rely on this)
///
/// # Errors
///
/// Returns [`ScryError::Http`] if the client cannot be constructed.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, ScryError> {
    let ua = match config.user_agent {
        Some(ref custom) => custom.clone(),
        None => random_user_agent().to_owned(),
    };

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| ScryError::Http(format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Host of `url` for error messages.
fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| "invalid url".to_owned())
}

/// Sends `request`, failing on transport errors and non-success status.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] naming `label`.
pub async fn send(
    request: reqwest::RequestBuilder,
    label: &str,
) -> Result<reqwest::Response, BackendError> {
    request
        .send()
        .await
        .map_err(|e| BackendError::Backend(format!("{label} request failed: {}", e.without_url())))?
        .error_for_status()
        .map_err(|e| BackendError::Backend(format!("{label} HTTP error: {}", e.without_url())))
}

/// GETs `url` and returns the body.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] on transport failure or non-2xx status.
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<Bytes, BackendError> {
    let label = host_of(url);
    tracing::trace!(host = %label, "fetching bytes");
    send(client.get(url).headers(headers), &label)
        .await?
        .bytes()
        .await
        .map_err(|e| BackendError::Backend(format!("{label} response read failed: {}", e.without_url())))
}

/// GETs `url` and parses the body as JSON.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] on transport failure, non-2xx status
/// or a body that does not parse as `T`.
pub async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<T, BackendError> {
    let label = host_of(url);
    tracing::trace!(host = %label, "fetching json");
    send(client.get(url).headers(headers), &label)
        .await?
        .json::<T>()
        .await
        .map_err(|e| BackendError::Backend(format!("{label} returned invalid JSON: {}", e.without_url())))
}

/// GETs `url` and returns the body as text.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] on transport failure or non-2xx status.
pub async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<String, BackendError> {
    let label = host_of(url);
    tracing::trace!(host = %label, "fetching text");
    send(client.get(url).headers(headers), &label)
        .await?
        .text()
        .await
        .map_err(|e| BackendError::Backend(format!("{label} response read failed: {}", e.without_url())))
}

/// Parses a JSON body already received.
///
/// # Errors
///
/// Returns [`BackendError::Backend`] naming `label` when parsing fails.
pub async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    label: &str,
) -> Result<T, BackendError> {
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Backend(format!("{label} returned invalid JSON: {}", e.without_url())))
}
