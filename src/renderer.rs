//! Rendering collaborators.
//!
//! [`RemoteRenderer`] drives an HTTP screenshot service: it opens a page
//! session, submits the document, waits for the page to report ready and
//! takes a JPEG screenshot. The session is closed on every path, including
//! timeouts and cancellation. [`JsonRenderer`] is the offline stand-in that
//! returns the request itself.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use scry_core::{auto_quality, race_ready, BackendError, Lease, Quality, RenderRequest, Renderer};

use crate::config::RenderConfig;

#[derive(Debug, Deserialize)]
struct SessionCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReadyState {
    ready: bool,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    template: &'a str,
    document: &'a serde_json::Value,
}

fn render_error(stage: &str, e: reqwest::Error) -> BackendError {
    BackendError::Render(format!("{stage} failed: {}", e.without_url()))
}

/// An open page session on the screenshot service.
struct SessionLease {
    client: reqwest::Client,
    url: String,
}

#[async_trait]
impl Lease for SessionLease {
    fn name(&self) -> &str {
        "render session"
    }

    async fn release(&self) {
        let result = self
            .client
            .delete(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(e) = result {
            tracing::warn!(error = %e.without_url(), "failed to close render session");
        }
    }
}

/// Screenshot service client.
#[derive(Debug, Clone)]
pub struct RemoteRenderer {
    client: reqwest::Client,
    endpoint: String,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl RemoteRenderer {
    /// Renderer for the service configured in `config`.
    pub fn new(client: reqwest::Client, config: &RenderConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            ready_timeout: Duration::from_secs(config.ready_timeout_seconds),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    async fn open_session(&self, width: u32, scale: f64) -> Result<String, BackendError> {
        let created: SessionCreated = self
            .client
            .post(format!("{}/sessions", self.endpoint))
            .json(&json!({"width": width, "height": 10, "scale": scale}))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| render_error("opening session", e))?
            .json()
            .await
            .map_err(|e| render_error("reading session", e))?;
        tracing::debug!(session = %created.id, "render session opened");
        Ok(created.id)
    }

    /// Submits the document and polls until the page reports ready.
    /// Resolves to the page height.
    async fn wait_ready(&self, session: &str, request: &RenderRequest) -> Result<u32, BackendError> {
        self.client
            .put(format!("{session}/content"))
            .json(&Content {
                template: &request.template,
                document: &request.document,
            })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| render_error("submitting content", e))?;

        loop {
            let state: ReadyState = self
                .client
                .get(format!("{session}/ready"))
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| render_error("polling readiness", e))?
                .json()
                .await
                .map_err(|e| render_error("reading readiness", e))?;
            if state.ready {
                return Ok(state.height);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn screenshot(&self, session: &str, quality: u8) -> Result<Vec<u8>, BackendError> {
        let bytes = self
            .client
            .post(format!("{session}/screenshot"))
            .json(&json!({"type": "jpeg", "quality": quality, "full_page": true}))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| render_error("taking screenshot", e))?
            .bytes()
            .await
            .map_err(|e| render_error("reading screenshot", e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Renderer for RemoteRenderer {
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, BackendError> {
        let id = self.open_session(request.width, request.scale).await?;
        let session = format!("{}/sessions/{id}", self.endpoint);
        let lease = SessionLease {
            client: self.client.clone(),
            url: session.clone(),
        };
        let requested = request.quality;
        let session = session.as_str();

        race_ready(
            lease,
            self.ready_timeout,
            self.wait_ready(session, &request),
            |_, height| async move {
                let quality = match requested {
                    Quality::Fixed(q) => q,
                    Quality::Auto => {
                        let q = auto_quality(height);
                        tracing::debug!(height, quality = q, "auto quality");
                        q
                    }
                };
                self.screenshot(session, quality).await
            },
        )
        .await
    }
}

/// Renders nothing; returns the pretty-printed request.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

#[async_trait]
impl Renderer for JsonRenderer {
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, BackendError> {
        serde_json::to_vec_pretty(&request)
            .map_err(|e| BackendError::Render(format!("document encoding failed: {e}")))
    }
}
