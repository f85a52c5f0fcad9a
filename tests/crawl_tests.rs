//! Integration tests for the crawler
//!
//! File-based crawls run against the fixtures under `tests/data`; HTTP
//! crawls serve the same fixtures (or synthesized API pages) from wiremock
//! mock servers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use stac_crawler::{
    crawl, CrawlError, Crawler, CrawlerOptions, Resource, ResourceInfo, ResourceType,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn data_path(relative: &str) -> String {
    format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), relative)
}

/// Shared visit bookkeeping: counts visits, remembers locations, and fails
/// on a repeat visit to the same location.
#[derive(Default)]
struct Recorder {
    count: AtomicUsize,
    visited: Mutex<HashSet<String>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, _resource: &Resource, info: &ResourceInfo) -> stac_crawler::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let mut visited = self.visited.lock().unwrap();
        if !visited.insert(info.location.clone()) {
            return Err(CrawlError::Visitor(format!(
                "already visited {}",
                info.location
            )));
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn contains(&self, location: &str) -> bool {
        self.visited.lock().unwrap().contains(location)
    }
}

fn visitor_for(
    recorder: &Arc<Recorder>,
) -> impl Fn(&Resource, &ResourceInfo) -> stac_crawler::Result<()> + Send + Sync + 'static {
    let recorder = Arc::clone(recorder);
    move |resource, info| recorder.record(resource, info)
}

async fn mount_fixture(server: &MockServer, url_path: &str, fixture: &str) {
    let body = std::fs::read(data_path(fixture)).unwrap();
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "application/json"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_static_catalog_tree() {
    let recorder = Recorder::new();
    crawl(
        &data_path("v1.0.0/catalog-with-collection-of-items.json"),
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(recorder.count(), 3);
    assert!(recorder.contains(&data_path("v1.0.0/catalog-with-collection-of-items.json")));
    assert!(recorder.contains(&data_path("v1.0.0/collection-with-items.json")));
    assert!(recorder.contains(&data_path("v1.0.0/item-in-collection.json")));
}

#[tokio::test]
async fn test_crawl_entry_is_stable_across_visits() {
    let entries = Arc::new(Mutex::new(HashSet::new()));
    let seen = Arc::clone(&entries);
    crawl(
        &data_path("v1.0.0/catalog-with-collection-of-items.json"),
        move |_resource: &Resource, info: &ResourceInfo| -> stac_crawler::Result<()> {
            seen.lock().unwrap().insert(info.entry.clone());
            Ok(())
        },
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries.contains(&data_path("v1.0.0/catalog-with-collection-of-items.json")));
}

#[tokio::test]
async fn test_crawl_filter_rejects_item() {
    let recorder = Recorder::new();
    crawl(
        &data_path("v1.0.0/catalog-with-collection-of-items.json"),
        visitor_for(&recorder),
        CrawlerOptions {
            filter: Some(Arc::new(|location: &str| {
                !location.ends_with("/item-in-collection.json")
            })),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(recorder.count(), 2);
    assert!(recorder.contains(&data_path("v1.0.0/collection-with-items.json")));
}

#[tokio::test]
async fn test_crawl_filter_rejects_collection() {
    let recorder = Recorder::new();
    crawl(
        &data_path("v1.0.0/catalog-with-collection-of-items.json"),
        visitor_for(&recorder),
        CrawlerOptions {
            filter: Some(Arc::new(|location: &str| {
                !location.ends_with("/collection-with-items.json")
            })),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(recorder.count(), 1);
    assert!(recorder.contains(&data_path("v1.0.0/catalog-with-collection-of-items.json")));
}

#[tokio::test]
async fn test_crawl_stop_recursion() {
    let count = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&count);
    crawl(
        &data_path("v1.0.0/catalog-with-collection-of-items.json"),
        move |_resource: &Resource, _info: &ResourceInfo| -> stac_crawler::Result<()> {
            counted.fetch_add(1, Ordering::SeqCst);
            Err(CrawlError::StopRecursion)
        },
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_crawl_http_catalog_tree() {
    let server = MockServer::start().await;
    mount_fixture(
        &server,
        "/v1.0.0/catalog-with-collection-of-items.json",
        "v1.0.0/catalog-with-collection-of-items.json",
    )
    .await;
    mount_fixture(
        &server,
        "/v1.0.0/collection-with-items.json",
        "v1.0.0/collection-with-items.json",
    )
    .await;
    mount_fixture(
        &server,
        "/v1.0.0/item-in-collection.json",
        "v1.0.0/item-in-collection.json",
    )
    .await;

    let recorder = Recorder::new();
    crawl(
        &format!(
            "{}/v1.0.0/catalog-with-collection-of-items.json",
            server.uri()
        ),
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(recorder.count(), 3);
    assert!(recorder.contains(&format!(
        "{}/v1.0.0/catalog-with-collection-of-items.json",
        server.uri()
    )));
    assert!(recorder.contains(&format!("{}/v1.0.0/collection-with-items.json", server.uri())));
    assert!(recorder.contains(&format!("{}/v1.0.0/item-in-collection.json", server.uri())));
}

#[tokio::test]
async fn test_crawl_http_error_status_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let recorder = Recorder::new();
    let error = crawl(
        &format!("{}/not-found", server.uri()),
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(error.to_string().starts_with("unexpected response"));
    assert!(error.to_string().ends_with("500"));
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn test_crawl_decode_error_is_fatal() {
    let recorder = Recorder::new();
    let error = crawl(
        &data_path("v1.0.0/not-json.json"),
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(error.to_string().starts_with("failed to parse"));
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn test_crawl_api_catalog() {
    let recorder = Recorder::new();
    crawl(
        &data_path("v1.0.0/api-catalog.json"),
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    // The `data` link wins over the `child` link, so the collection is
    // reached through the collections page exactly once.
    assert_eq!(recorder.count(), 3);
    assert!(recorder.contains(&data_path("v1.0.0/api-catalog.json")));
    assert!(recorder.contains(&data_path("v1.0.0/collection-with-items.json")));
    assert!(recorder.contains(&data_path("v1.0.0/item-in-collection.json")));
}

#[tokio::test]
async fn test_crawl_api_collection() {
    let recorder = Recorder::new();
    crawl(
        &data_path("v1.0.0/api-collection.json"),
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(recorder.count(), 2);
    assert!(recorder.contains(&data_path("v1.0.0/api-collection.json")));
    assert!(recorder.contains(&data_path("v1.0.0/item-in-collection.json")));
}

#[tokio::test]
async fn test_crawl_legacy_collection() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    crawl(
        &data_path("v0.8.1/root-collection.json"),
        move |resource: &Resource, _info: &ResourceInfo| -> stac_crawler::Result<()> {
            *sink.lock().unwrap() = resource.resource_type();
            Ok(())
        },
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(ResourceType::Collection));
}

#[tokio::test]
async fn test_crawl_paginated_api() {
    let server = MockServer::start().await;
    let base = server.uri();

    let root = json!({
        "type": "Catalog",
        "id": "paginated-api",
        "stac_version": "1.0.0",
        "description": "An API root with paginated collections and items",
        "conformsTo": [
            "https://api.stacspec.org/v1.0.0/core",
            "https://api.stacspec.org/v1.0.0/ogcapi-features"
        ],
        "links": [
            {"rel": "data", "href": format!("{base}/collections"), "type": "application/json"}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&root))
        .mount(&server)
        .await;

    let collections_page_1 = json!({
        "collections": [{
            "type": "Collection",
            "id": "c1",
            "stac_version": "1.0.0",
            "description": "first collection",
            "license": "CC-BY-4.0",
            "extent": {},
            "links": [
                {"rel": "self", "href": format!("{base}/collections/c1"), "type": "application/json"},
                {"rel": "items", "href": format!("{base}/collections/c1/items"), "type": "application/geo+json"}
            ]
        }],
        "links": [
            {"rel": "next", "href": format!("{base}/collections-page-2"), "type": "application/json"}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&collections_page_1))
        .mount(&server)
        .await;

    let collections_page_2 = json!({
        "collections": [{
            "type": "Collection",
            "id": "c2",
            "stac_version": "1.0.0",
            "description": "second collection",
            "license": "CC-BY-4.0",
            "extent": {},
            "links": [
                {"rel": "self", "href": format!("{base}/collections/c2"), "type": "application/json"},
                {"rel": "items", "href": format!("{base}/collections/c2/items"), "type": "application/geo+json"}
            ]
        }],
        "links": []
    });
    Mock::given(method("GET"))
        .and(path("/collections-page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&collections_page_2))
        .mount(&server)
        .await;

    let feature = |id: &str| {
        json!({
            "type": "Feature",
            "id": id,
            "stac_version": "1.0.0",
            "geometry": null,
            "properties": {"datetime": "2020-12-11T22:38:32Z"},
            "links": [
                {"rel": "self", "href": format!("{base}/items/{id}"), "type": "application/geo+json"}
            ]
        })
    };

    // The items links carry the pagination hint appended by the crawler.
    let c1_items = json!({
        "type": "FeatureCollection",
        "features": [feature("i1")],
        "links": [
            {"rel": "next", "href": format!("{base}/collections/c1/items-page-2"), "type": "application/json"}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/collections/c1/items"))
        .and(query_param("limit", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&c1_items))
        .mount(&server)
        .await;

    let c1_items_page_2 = json!({
        "type": "FeatureCollection",
        "features": [feature("i2")],
        "links": []
    });
    Mock::given(method("GET"))
        .and(path("/collections/c1/items-page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&c1_items_page_2))
        .mount(&server)
        .await;

    let c2_items = json!({
        "type": "FeatureCollection",
        "features": [feature("i3")],
        "links": []
    });
    Mock::given(method("GET"))
        .and(path("/collections/c2/items"))
        .and(query_param("limit", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&c2_items))
        .mount(&server)
        .await;

    let recorder = Recorder::new();
    crawl(
        &format!("{base}/api"),
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    // 1 root + 2 collections + 3 items across three pages.
    assert_eq!(recorder.count(), 6);
    assert!(recorder.contains(&format!("{base}/collections/c1")));
    assert!(recorder.contains(&format!("{base}/collections/c2")));
    assert!(recorder.contains(&format!("{base}/items/i1")));
    assert!(recorder.contains(&format!("{base}/items/i2")));
    assert!(recorder.contains(&format!("{base}/items/i3")));
}

#[tokio::test]
async fn test_crawl_visitor_error_aborts() {
    let recorder = Recorder::new();
    let inner = Arc::clone(&recorder);
    let error = crawl(
        &data_path("v1.0.0/catalog-with-collection-of-items.json"),
        move |resource: &Resource, info: &ResourceInfo| -> stac_crawler::Result<()> {
            inner.record(resource, info)?;
            if info.location.ends_with("/collection-with-items.json") {
                return Err(CrawlError::Visitor("boom".to_string()));
            }
            Ok(())
        },
        CrawlerOptions::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(error.to_string(), "boom");
    assert!(!recorder.contains(&data_path("v1.0.0/item-in-collection.json")));
}

#[tokio::test]
async fn test_crawl_error_handler_swallows_and_continues() {
    let recorder = Recorder::new();
    let swallowed = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&swallowed);
    crawl(
        &data_path("v1.0.0/catalog-with-missing-child.json"),
        visitor_for(&recorder),
        CrawlerOptions {
            error_handler: Some(Arc::new(move |_error| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(recorder.count(), 1);
    assert_eq!(swallowed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_crawl_mode_violation_in_file_mode() {
    let recorder = Recorder::new();
    let error = crawl(
        &data_path("v1.0.0/catalog-with-url-child.json"),
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        error.to_string(),
        "cannot crawl URL https://stac.example.com/collection.json in file mode"
    );
    assert_eq!(recorder.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crawl_concurrency_bound() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let count = Arc::new(AtomicUsize::new(0));

    let current_in = Arc::clone(&current);
    let peak_in = Arc::clone(&peak);
    let count_in = Arc::clone(&count);
    crawl(
        &data_path("v1.0.0/catalog-of-items.json"),
        move |_resource: &Resource, _info: &ResourceInfo| -> stac_crawler::Result<()> {
            let now = current_in.fetch_add(1, Ordering::SeqCst) + 1;
            peak_in.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            current_in.fetch_sub(1, Ordering::SeqCst);
            count_in.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        CrawlerOptions {
            concurrency: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 5);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_crawl_multiple_entries() {
    let recorder = Recorder::new();
    let crawler = Crawler::new(visitor_for(&recorder), CrawlerOptions::default());
    crawler.add(&data_path("v1.0.0/catalog.json")).await.unwrap();
    crawler
        .add(&data_path("v1.0.0/catalog-with-collection-of-items.json"))
        .await
        .unwrap();
    crawler.wait().await.unwrap();

    assert_eq!(recorder.count(), 4);
    assert!(recorder.contains(&data_path("v1.0.0/catalog.json")));
}

#[tokio::test]
async fn test_crawl_relative_entry_resolves_against_cwd() {
    // Integration tests run with the crate root as working directory.
    let recorder = Recorder::new();
    crawl(
        "tests/data/v1.0.0/catalog.json",
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(recorder.count(), 1);
    assert!(recorder.contains(&data_path("v1.0.0/catalog.json")));
}

#[tokio::test]
async fn test_crawl_relative_entry_with_dot_segments_is_cleaned() {
    let recorder = Recorder::new();
    crawl(
        "tests/data/v0.8.1/../v1.0.0/./catalog.json",
        visitor_for(&recorder),
        CrawlerOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(recorder.count(), 1);
    assert!(recorder.contains(&data_path("v1.0.0/catalog.json")));
}
