//! Integration tests for the aggregation pipeline.
//!
//! These tests drive registry → task → accumulator → merge with synthetic
//! backends (no network calls) and check that the merged output only
//! depends on the backend outputs, never on completion or merge order.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use scry_core::{
    Accumulator, BackendError, Harvest, LinkDispatcher, LinkPatterns, Mark, Registry,
    ResultItem, Route, Similarity, Task,
};

#[derive(Clone)]
struct FakeEngine {
    name: &'static str,
    enabled: bool,
    items: Arc<Vec<(String, f64, Mark)>>,
}

impl FakeEngine {
    fn new(name: &'static str, items: &[(&str, f64, Mark)]) -> Self {
        Self {
            name,
            enabled: true,
            items: Arc::new(
                items
                    .iter()
                    .map(|(u, s, m)| ((*u).to_owned(), *s, *m))
                    .collect(),
            ),
        }
    }

    fn prepare(&self) -> Option<Task<Harvest>> {
        if !self.enabled {
            return None;
        }
        let name = self.name;
        let items = Arc::clone(&self.items);
        Some(Task::pending(name, async move {
            let mut harvest = Harvest::new();
            for (url, sim, mark) in items.iter() {
                harvest.push(
                    ResultItem::new(url.clone(), name, *sim).with_mark(*mark),
                    None,
                );
            }
            Ok(harvest)
        }))
    }
}

fn engines() -> Registry<FakeEngine> {
    let mut registry = Registry::new("engine");
    registry
        .register(
            "alpha",
            FakeEngine::new(
                "Alpha",
                &[
                    ("https://a/1", 0.40, Mark::Uncertain),
                    ("https://a/2", 0.75, Mark::Uncertain),
                    ("https://a/3", 0.10, Mark::Confirmed),
                ],
            ),
        )
        .register(
            "beta",
            FakeEngine::new(
                "Beta",
                &[
                    ("https://b/1", 0.75, Mark::Uncertain),
                    ("https://b/2", 0.99, Mark::Rejected),
                ],
            ),
        )
        .register(
            "gamma",
            FakeEngine::new(
                "Gamma",
                &[
                    ("https://g/1", 0.60, Mark::Uncertain),
                    ("https://g/2", 0.75, Mark::Uncertain),
                ],
            ),
        );
    registry
}

async fn run_all(registry: &Registry<FakeEngine>) -> Vec<Accumulator> {
    let tasks = registry.resolve(None, FakeEngine::prepare).expect("resolve");
    futures::future::join_all(tasks.into_iter().map(Accumulator::run)).await
}

fn urls(acc: &Accumulator) -> Vec<&str> {
    acc.results().iter().map(|r| r.url.as_str()).collect()
}

#[tokio::test]
async fn merge_is_independent_of_order() {
    let registry = engines();

    let forward = Accumulator::merge_all(run_all(&registry).await, 0.5, 4);
    let mut reversed_input = run_all(&registry).await;
    reversed_input.reverse();
    let reversed = Accumulator::merge_all(reversed_input, 0.5, 4);

    let mut rotated_input = run_all(&registry).await;
    rotated_input.rotate_left(1);
    let rotated = Accumulator::merge_all(rotated_input, 0.5, 4);

    assert_eq!(urls(&forward), urls(&reversed));
    assert_eq!(urls(&forward), urls(&rotated));
    assert_eq!(
        urls(&forward),
        vec!["https://a/3", "https://a/2", "https://b/1", "https://g/2"]
    );
}

#[tokio::test]
async fn nested_merge_matches_flat_merge() {
    let registry = engines();
    let mut accs = run_all(&registry).await;
    let c = accs.pop().expect("gamma");
    let b = accs.pop().expect("beta");
    let a = accs.pop().expect("alpha");

    let nested = a.merge(vec![b], -9999.0, 100).merge(vec![c], 0.5, 3);
    let flat = Accumulator::merge_all(run_all(&registry).await, 0.5, 3);
    assert_eq!(urls(&nested), urls(&flat));
}

#[tokio::test]
async fn max_count_is_exact_and_keeps_best() {
    let registry = engines();
    let merged = Accumulator::merge_all(run_all(&registry).await, -9999.0, 2);
    assert_eq!(merged.results().len(), 2);
    assert_eq!(merged.results()[0].mark, Mark::Confirmed);
    assert_eq!(merged.results()[1].similarity, Similarity::Score(0.75));

    let all = Accumulator::merge_all(run_all(&registry).await, -9999.0, 100);
    assert_eq!(all.results().len(), 6);
}

#[tokio::test]
async fn confirmed_never_filtered_rejected_never_kept() {
    let mut registry = Registry::new("engine");
    registry
        .register("one", FakeEngine::new("One", &[("https://c", 0.90, Mark::Confirmed)]))
        .register("two", FakeEngine::new("Two", &[("https://u", 0.95, Mark::Uncertain)]))
        .register("three", FakeEngine::new("Three", &[("https://r", 0.99, Mark::Rejected)]));

    let merged = Accumulator::merge_all(run_all(&registry).await, 0.92, 30);
    assert_eq!(urls(&merged), vec!["https://c"]);
}

#[tokio::test]
async fn diagnostics_cover_every_backend_including_failures() {
    let mut accs = run_all(&engines()).await;
    accs.push(
        Accumulator::run(Task::failed(
            "Broken",
            BackendError::Backend("HTTP 503".into()),
        ))
        .await,
    );
    let merged = Accumulator::merge_all(accs, -9999.0, 30);
    assert_eq!(merged.details().len(), 4);
    assert_eq!(merged.errors().len(), 1);
    let broken = merged
        .details()
        .iter()
        .find(|d| d.name == "Broken")
        .expect("broken detail");
    assert!(broken.failed);
    assert_eq!(broken.text, "Broken: backend failure: HTTP 503");
    assert!(merged
        .details()
        .windows(2)
        .all(|w| w[0].elapsed <= w[1].elapsed));
}

#[tokio::test]
async fn disabled_engine_is_skipped_or_not_implemented() {
    let mut registry = engines();
    let mut off = FakeEngine::new("Off", &[("https://off", 1.0, Mark::Confirmed)]);
    off.enabled = false;
    registry.register("off", off);

    let all = registry.resolve(None, FakeEngine::prepare).expect("resolve");
    assert_eq!(all.len(), 3);

    let named = registry.resolve(Some("off"), FakeEngine::prepare);
    assert!(matches!(named, Err(BackendError::NotImplemented(_))));

    let unknown = registry.resolve(Some("nope"), FakeEngine::prepare);
    assert!(matches!(unknown, Err(BackendError::NotImplemented(_))));
}

#[test]
fn unknown_domain_falls_through_to_https_scheme() {
    let mut dispatcher = LinkDispatcher::new();
    dispatcher
        .register_domain("e621.net", "e621")
        .register_scheme("https", "generic");

    let resolved = dispatcher.resolve("https://example.com/x").expect("resolve");
    assert_eq!(*resolved.handler, "generic");
    assert_eq!(resolved.route, Route::Scheme);
    assert_eq!(resolved.link.host(), "example.com");
}

#[test]
fn extraction_follows_registration_order() {
    let mut patterns = LinkPatterns::new();
    patterns
        .register_str(r"(rule34\.xxx/index\.php\?[^\s]*id=\d+)")
        .expect("valid")
        .register_str(r"((?:https?://)?e621\.net/posts/\d+)")
        .expect("valid");

    let text = "e621.net/posts/1 and rule34.xxx/index.php?page=post&s=view&id=7 then e621.net/posts/2";
    assert_eq!(
        patterns.extract(text),
        vec![
            "rule34.xxx/index.php?page=post&s=view&id=7",
            "e621.net/posts/1",
            "e621.net/posts/2",
        ]
    );
    assert!(patterns.extract("plain chatter").is_empty());
}
