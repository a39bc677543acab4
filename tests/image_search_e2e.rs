//! End-to-end image search against mocked engine APIs.
//!
//! SauceNAO and Fluffle are served by wiremock; IQDB and trace.moe are
//! disabled. Thumbnails are fetched from the same mock server, scored
//! against the query image, merged, and rendered with the JSON renderer.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use scry::config::ImageSearchConfig;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use scry::image_search::{
    build_engines, render_results, EngineContext, ImageSearch, SearchInput, SearchRequest,
};
use scry::link_preview::build_patterns;
use scry::JsonRenderer;
use scry_core::{BackendError, Mark, RenderOptions, RenderRequest, Renderer};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn encode(img: GrayImage) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode");
    out.into_inner()
}

fn gradient() -> Vec<u8> {
    encode(GrayImage::from_fn(16, 16, |x, y| Luma([((x + y) * 8) as u8])))
}

fn flat_white() -> Vec<u8> {
    encode(GrayImage::from_pixel(16, 16, Luma([255])))
}

async fn mount_saucenao(server: &MockServer) {
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/search.php"))
        .and(query_param("output_type", "2"))
        .and(query_param("db", "999"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": {"status": 0},
            "results": [
                {
                    "header": {"thumbnail": format!("{base}/thumbs/same.png"), "index_name": "Pixiv"},
                    "data": {"ext_urls": ["https://www.pixiv.net/artworks/1"], "title": "Same picture"}
                },
                {
                    "header": {"thumbnail": format!("{base}/thumbs/other.png"), "index_name": "Danbooru"},
                    "data": {"source": "https://danbooru.donmai.us/posts/2"}
                }
            ]
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_fluffle(server: &MockServer) {
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {
                    "location": "https://e621.net/posts/77",
                    "score": 0.97,
                    "match": "exact",
                    "platform": "e621",
                    "thumbnail": {"location": format!("{base}/thumbs/other.png")}
                },
                {
                    "location": "https://furaffinity.net/view/5",
                    "score": 0.4,
                    "match": "unlikely",
                    "platform": "Fur Affinity",
                    "thumbnail": {"location": format!("{base}/thumbs/same.png")}
                }
            ]
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_thumbnails(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/thumbs/same.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gradient()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/thumbs/other.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(flat_white()))
        .mount(server)
        .await;
}

#[derive(Default)]
struct CountingRenderer {
    calls: AtomicUsize,
}

#[async_trait]
impl Renderer for CountingRenderer {
    async fn render(&self, _request: RenderRequest) -> Result<Vec<u8>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(b"card".to_vec())
    }
}

fn config(server: &MockServer) -> ImageSearchConfig {
    let mut config = ImageSearchConfig::default();
    config.saucenao.endpoint = format!("{}/search.php", server.uri());
    config.fluffle.endpoint = format!("{}/v1/search", server.uri());
    config.iqdb.enabled = false;
    config.tracemoe.enabled = false;
    config
}

#[tokio::test]
async fn merges_engines_and_releases_thumbnails() {
    let server = MockServer::start().await;
    mount_saucenao(&server).await;
    mount_fluffle(&server).await;
    mount_thumbnails(&server).await;
    let scratch = tempfile::tempdir().expect("tempdir");

    let search = ImageSearch::new(build_engines(), build_patterns().expect("patterns"));
    let ctx = EngineContext {
        client: reqwest::Client::new(),
        config: config(&server),
        scratch_dir: scratch.path().to_path_buf(),
    };
    let request = SearchRequest {
        engine: Some("all".into()),
        min_similarity: Some(0.9),
        max_count: Some(10),
    };

    let merged = search
        .search(SearchInput::from_bytes(gradient()), &request, ctx)
        .await
        .expect("search");

    let urls: Vec<&str> = merged.results().iter().map(|r| r.url.as_str()).collect();
    // The exact Fluffle hit survives despite its dissimilar thumbnail; the
    // dissimilar SauceNAO hit does not.
    assert_eq!(urls[0], "https://e621.net/posts/77");
    assert!(urls.contains(&"https://www.pixiv.net/artworks/1"));
    assert!(!urls.contains(&"https://danbooru.donmai.us/posts/2"));
    // Fluffle keeps exact matches only by default.
    assert!(!urls.contains(&"https://furaffinity.net/view/5"));

    let top = &merged.results()[0];
    assert_eq!(top.mark, Mark::Confirmed);
    assert!(top.previewable);
    assert_eq!(merged.details().len(), 2);
    assert!(merged.errors().is_empty());
    assert!(std::fs::read_dir(scratch.path()).expect("scratch").count() > 0);

    let bytes = merged
        .render(&JsonRenderer, &RenderOptions::new(chrono::Local::now()))
        .await
        .expect("render");
    let request: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(request["template"], "image_search");
    assert_eq!(request["document"]["results"][0]["confirmed"], true);
    assert_eq!(request["document"]["max_count"], 10);

    assert_eq!(std::fs::read_dir(scratch.path()).expect("scratch").count(), 0);
}

#[tokio::test]
async fn single_engine_selection_is_case_insensitive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let scratch = tempfile::tempdir().expect("tempdir");
    let search = ImageSearch::new(build_engines(), build_patterns().expect("patterns"));
    let ctx = EngineContext {
        client: reqwest::Client::new(),
        config: config(&server),
        scratch_dir: scratch.path().to_path_buf(),
    };
    let request = SearchRequest {
        engine: Some("Fluffle".into()),
        ..Default::default()
    };

    let merged = search
        .search(SearchInput::from_bytes(gradient()), &request, ctx)
        .await
        .expect("search");
    assert!(merged.results().is_empty());
    assert_eq!(merged.details().len(), 1);
}

#[tokio::test]
async fn empty_results_skip_rendering() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let scratch = tempfile::tempdir().expect("tempdir");
    let search = ImageSearch::new(build_engines(), build_patterns().expect("patterns"));
    let ctx = EngineContext {
        client: reqwest::Client::new(),
        config: config(&server),
        scratch_dir: scratch.path().to_path_buf(),
    };
    let request = SearchRequest {
        engine: Some("fluffle".into()),
        ..Default::default()
    };
    let merged = search
        .search(SearchInput::from_bytes(gradient()), &request, ctx)
        .await
        .expect("search");

    let renderer = CountingRenderer::default();
    let options = RenderOptions::new(chrono::Local::now());
    let card = render_results(merged, &renderer, &options).await.expect("render");
    assert!(card.is_none());
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn found_results_are_rendered_once() {
    let server = MockServer::start().await;
    mount_fluffle(&server).await;
    mount_thumbnails(&server).await;

    let scratch = tempfile::tempdir().expect("tempdir");
    let search = ImageSearch::new(build_engines(), build_patterns().expect("patterns"));
    let ctx = EngineContext {
        client: reqwest::Client::new(),
        config: config(&server),
        scratch_dir: scratch.path().to_path_buf(),
    };
    let request = SearchRequest {
        engine: Some("fluffle".into()),
        ..Default::default()
    };
    let merged = search
        .search(SearchInput::from_bytes(gradient()), &request, ctx)
        .await
        .expect("search");

    let renderer = CountingRenderer::default();
    let options = RenderOptions::new(chrono::Local::now());
    let card = render_results(merged, &renderer, &options).await.expect("render");
    assert_eq!(card.as_deref(), Some(b"card".as_slice()));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_engine_is_reported_not_fatal() {
    let server = MockServer::start().await;
    mount_fluffle(&server).await;
    mount_thumbnails(&server).await;
    let mut config = config(&server);
    config.saucenao.endpoint = format!("{}/broken", server.uri());
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let scratch = tempfile::tempdir().expect("tempdir");
    let search = ImageSearch::new(build_engines(), build_patterns().expect("patterns"));
    let ctx = EngineContext {
        client: reqwest::Client::new(),
        config,
        scratch_dir: scratch.path().to_path_buf(),
    };

    let merged = search
        .search(SearchInput::from_bytes(gradient()), &SearchRequest::default(), ctx)
        .await
        .expect("search");
    assert_eq!(merged.errors().len(), 1);
    assert!(merged.details().iter().any(|d| d.failed));
    assert_eq!(merged.results()[0].url, "https://e621.net/posts/77");
}

#[tokio::test]
async fn unknown_engine_is_not_implemented() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let search = ImageSearch::new(build_engines(), build_patterns().expect("patterns"));
    let ctx = EngineContext {
        client: reqwest::Client::new(),
        config: ImageSearchConfig::default(),
        scratch_dir: scratch.path().to_path_buf(),
    };
    let request = SearchRequest {
        engine: Some("google".into()),
        ..Default::default()
    };

    let err = search
        .search(SearchInput::from_bytes(gradient()), &request, ctx)
        .await
        .unwrap_err();
    assert!(err.is_not_implemented());
}
