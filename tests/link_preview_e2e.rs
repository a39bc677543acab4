//! End-to-end link previews: extraction, dispatch, fetch, cache and
//! rendering through the remote screenshot service, all against wiremock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use scry::config::{LinkPreviewConfig, RenderConfig};
use scry::link_preview::{LinkPreviewer, PreviewContext};
use scry::{FileCache, JsonRenderer, RemoteRenderer};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(dir: &std::path::Path, config: LinkPreviewConfig) -> Arc<PreviewContext> {
    Arc::new(PreviewContext {
        client: reqwest::Client::new(),
        cache: FileCache::new(dir),
        config,
    })
}

async fn mount_e621(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/posts/42.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"post": {
            "id": 42,
            "created_at": "2024-03-01T10:20:30.123-05:00",
            "rating": "e",
            "score": {"up": 10, "down": 0, "total": 10},
            "flags": {"deleted": false},
            "sample": {"url": format!("{}/data/sample.jpg", server.uri())},
            "description": "",
            "tags": {"general": ["sky"]},
            "comment_count": 0,
            "fav_count": 3
        }})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/sample.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .mount(server)
        .await;
}

async fn mount_render_service(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1"})))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/sessions/p1/content"))
        .and(body_partial_json(json!({"template": "e621"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sessions/p1/ready"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": true, "height": 900})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/p1/screenshot"))
        .and(body_partial_json(json!({"quality": 90})))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]))
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/sessions/p1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn extracted_e621_link_renders_and_saves_card() {
    let api = MockServer::start().await;
    let render = MockServer::start().await;
    mount_e621(&api).await;
    mount_render_service(&render).await;

    let previewer = LinkPreviewer::new().expect("previewer");
    let links = previewer.extract("look at e621.net/posts/42 and https://example.com/x");
    assert_eq!(links, ["e621.net/posts/42"]);

    let cache = tempfile::tempdir().expect("tempdir");
    let mut config = LinkPreviewConfig::default();
    config.e621.api_url = api.uri();
    let preview = previewer
        .preview(&links[0], context(cache.path(), config))
        .expect("dispatch")
        .execute()
        .await
        .expect("preview");

    let render_config = RenderConfig {
        endpoint: render.uri(),
        ..Default::default()
    };
    let renderer = RemoteRenderer::new(reqwest::Client::new(), &render_config);
    let image = preview.render(&renderer, &render_config).await.expect("render");

    assert_eq!(image, [0xFF, 0xD8, 0xFF, 0xE0]);
    let saved = std::fs::read(cache.path().join("e621/42/preview.jpg")).expect("saved card");
    assert_eq!(saved, image);
    // Cached media is borrowed and outlives the render.
    assert!(cache.path().join("e621/42/photo").is_file());
}

#[tokio::test]
async fn bilibili_document_reaches_renderer() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/x/web-interface/view"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "0",
            "data": {
                "bvid": "BV1xx411c7mD",
                "aid": 2,
                "title": "Title",
                "desc": "desc",
                "pic": format!("{}/cover.jpg", api.uri()),
                "pubdate": 1_700_000_000,
                "duration": 125,
                "owner": {"mid": 1, "name": "up", "face": format!("{}/face.jpg", api.uri())},
                "stat": {"view": 12_345, "danmaku": 1, "reply": 2, "favorite": 3, "coin": 4, "share": 5, "like": 6}
            }
        })))
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .mount(&api)
        .await;

    let cache = tempfile::tempdir().expect("tempdir");
    let mut config = LinkPreviewConfig::default();
    config.bilibili.api_url = api.uri();
    let previewer = LinkPreviewer::new().expect("previewer");
    let preview = previewer
        .preview("https://www.bilibili.com/video/BV1xx411c7mD", context(cache.path(), config))
        .expect("dispatch")
        .execute()
        .await
        .expect("preview");

    let bytes = preview
        .render(&JsonRenderer, &RenderConfig::default())
        .await
        .expect("render");
    let request: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(request["template"], "bilibili");
    assert_eq!(request["quality"]["mode"], "auto");
    assert_eq!(request["document"]["url"], "https://www.bilibili.com/video/BV1xx411c7mD");
    assert!(request["document"]["_meta"]["render_time"].is_string());
}

#[tokio::test]
async fn bluesky_video_playlist_is_delivered_with_card() {
    let api = MockServer::start().await;
    let uri = api.uri();
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getPostThread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"thread": {"post": {
            "uri": "at://alice.test/app.bsky.feed.post/3kvid",
            "author": {"handle": "alice.test", "displayName": "Alice"},
            "record": {"text": "clip"},
            "embed": {
                "$type": "app.bsky.embed.video#view",
                "playlist": format!("{uri}/video/playlist.m3u8"),
                "thumbnail": format!("{uri}/video/thumbnail.jpg")
            },
            "indexedAt": "2024-05-01T12:00:00.000Z"
        }}})))
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/video/thumbnail.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .expect(1)
        .mount(&api)
        .await;

    let cache = tempfile::tempdir().expect("tempdir");
    let mut config = LinkPreviewConfig::default();
    config.bluesky.api_url = uri.clone();
    let previewer = LinkPreviewer::new().expect("previewer");
    let preview = previewer
        .preview("https://bsky.app/profile/alice.test/post/3kvid", context(cache.path(), config))
        .expect("dispatch")
        .execute()
        .await
        .expect("preview");

    let card = preview
        .render_card(&JsonRenderer, &RenderConfig::default())
        .await
        .expect("render");
    assert_eq!(card.extra_media, [format!("{uri}/video/playlist.m3u8")]);

    let request: Value = serde_json::from_slice(&card.image).expect("json");
    assert_eq!(request["template"], "bluesky");
    let items = &request["document"]["posts"][0]["content_items"];
    assert_eq!(items[0]["text"], "clip");
    assert_eq!(items[1]["type"], "video");
    assert_eq!(items[1]["text"], "Video");
}

#[tokio::test]
async fn unsupported_links_are_not_implemented() {
    let cache = tempfile::tempdir().expect("tempdir");
    let previewer = LinkPreviewer::new().expect("previewer");
    let ctx = context(cache.path(), LinkPreviewConfig::default());

    for link in ["https://example.com/posts/1", "https://live.bilibili.com/123"] {
        let err = previewer.preview(link, Arc::clone(&ctx)).unwrap_err();
        assert!(err.is_not_implemented(), "{link}: {err}");
    }
    assert!(!previewer.can_preview("https://example.com/posts/1"));
    assert!(previewer.can_preview("https://rule34.xxx/index.php?page=post&s=view&id=5"));
}
