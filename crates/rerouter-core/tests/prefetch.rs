mod common;

use common::prefetcher;
use rerouter_core::cache::CacheEntry;
use rerouter_core::{FetchOutcome, RerouterError};
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn fetch_and_store_rewrites_and_drops_validators() {
    let server = MockServer::start().await;
    let base = server.uri();
    let html = format!(r#"<a href="{base}/next">next</a>"#);

    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", "Mozilla/5.0 (compatible; Prefetcher)"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                .set_body_raw(html.into_bytes(), "text/html; charset=utf-8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pf = prefetcher(&base, dir.path(), 8);
    let target = format!("{base}/page");

    let outcome = pf
        .fetch_and_store(&target, Some("https://a.example"))
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Fetched);

    let entry = pf.store().get(&target).expect("entry stored");
    assert_eq!(entry.status, 200);
    assert_eq!(entry.url, target);
    assert_eq!(
        String::from_utf8(entry.body.clone()).unwrap(),
        r#"<a href="https://a.example/next">next</a>"#
    );
    assert_eq!(entry.content_type(), Some("text/html; charset=utf-8"));
    assert!(!entry.header.contains_key("ETag"));
    assert!(!entry.header.contains_key("Last-Modified"));
    assert!(pf.in_flight().is_empty());
}

#[tokio::test]
async fn body_is_stored_verbatim_without_rewrite_base() {
    let server = MockServer::start().await;
    let base = server.uri();
    let html = format!(r#"<a href="{base}/next">next</a>"#);

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .set_body_raw(html.clone().into_bytes(), "text/html"),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pf = prefetcher(&base, dir.path(), 8);
    let target = format!("{base}/plain");
    pf.fetch_and_store(&target, None).await.unwrap();

    let entry = pf.store().get(&target).unwrap();
    assert_eq!(entry.body, html.into_bytes());
    assert_eq!(entry.header.get("ETag").map(String::as_str), Some("\"v1\""));
}

#[tokio::test]
async fn fresh_cache_entry_skips_network() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pf = prefetcher(&base, dir.path(), 8);
    let target = format!("{base}/cached");
    let entry = CacheEntry::new(&target, 200, BTreeMap::new(), b"old".to_vec(), 600);
    pf.store().put(&target, &entry).unwrap();

    let outcome = pf.fetch_and_store(&target, None).await.unwrap();
    assert_eq!(outcome, FetchOutcome::CacheHitFresh);
}

#[tokio::test]
async fn non_200_is_an_error_and_stores_nothing() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pf = prefetcher(&base, dir.path(), 8);
    let target = format!("{base}/gone");

    let err = pf.fetch_and_store(&target, None).await.unwrap_err();
    assert!(matches!(err, RerouterError::HttpStatus { status: 404, .. }));
    assert!(pf.store().get(&target).is_none());
    assert_eq!(pf.store().list_all().count(), 0);
    assert!(pf.in_flight().is_empty());
}

#[tokio::test]
async fn empty_target_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pf = prefetcher("https://b.example", dir.path(), 8);
    assert!(matches!(
        pf.fetch_and_store("", None).await,
        Err(RerouterError::EmptyTarget)
    ));
}

#[tokio::test]
async fn concurrent_fetches_of_one_url_hit_upstream_once() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pf = prefetcher(&base, dir.path(), 8);
    let target = format!("{base}/slow");

    let (a, b) = tokio::join!(
        pf.fetch_and_store(&target, None),
        pf.fetch_and_store(&target, None)
    );
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| *o == FetchOutcome::InFlightElsewhere);
    assert_eq!(
        outcomes,
        vec![FetchOutcome::Fetched, FetchOutcome::InFlightElsewhere]
    );
}

#[tokio::test]
async fn workers_drain_enqueued_jobs() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/queued"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("warm")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pf = prefetcher(&base, dir.path(), 8);
    pf.start(2);
    let target = format!("{base}/queued");

    assert!(pf.enqueue(&target, None));
    assert!(!pf.enqueue(&target, None), "duplicate while in flight");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while pf.store().get(&target).is_none() {
        assert!(tokio::time::Instant::now() < deadline, "prefetch never landed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pf.store().get(&target).unwrap().body, b"warm");

    while !pf.in_flight().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "claim never released");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn full_queue_drops_job_and_clears_claim() {
    let dir = tempfile::tempdir().unwrap();
    // no workers started, so the single slot stays occupied
    let pf = prefetcher("https://b.example", dir.path(), 1);

    assert!(pf.enqueue("https://b.example/a", None));
    assert!(!pf.enqueue("https://b.example/b", None));
    assert!(pf.in_flight().contains("https://b.example/a"));
    assert!(!pf.in_flight().contains("https://b.example/b"));
}
