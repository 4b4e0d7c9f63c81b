mod common;

use common::{client, config, spawn, ADMIN_TOKEN};
use rerouter_core::CacheEntry;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn seed(store: &rerouter_core::CacheStore, urls: &[&str]) {
    for url in urls {
        let entry = CacheEntry::new(*url, 200, BTreeMap::new(), b"cached".to_vec(), 600);
        store.put(url, &entry).unwrap();
    }
}

#[tokio::test]
async fn admin_is_disabled_without_a_token() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config("https://b.example", dir.path());
    cfg.admin.token = None;
    let server = spawn(cfg).await;

    let resp = client()
        .post(server.url("/admin/purge?url=/x"))
        .header("x-admin-token", "anything")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert!(resp.text().await.unwrap().contains("admin disabled"));
}

#[tokio::test]
async fn wrong_token_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn(config("https://b.example", dir.path())).await;
    let http = client();

    let resp = http
        .get(server.url("/admin/sitemap-cache/status?token=nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert_eq!(resp.text().await.unwrap(), "forbidden");

    let resp = http
        .post(server.url("/admin/sitemap-cache"))
        .json(&json!({"sitemap_url": "https://b.example/sitemap.xml", "token": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn purge_by_path_with_json_body() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn(config("https://b.example", dir.path())).await;
    seed(
        &server.state.store,
        &["https://b.example/blog/one", "https://b.example/blog/two"],
    );

    let resp = client()
        .delete(server.url("/admin/purge"))
        .header("x-admin-token", ADMIN_TOKEN)
        .json(&json!({"url": "blog/one"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
    assert!(server.state.store.get("https://b.example/blog/one").is_none());
    assert!(server.state.store.get("https://b.example/blog/two").is_some());
}

#[tokio::test]
async fn partial_purge_via_query_and_missing_url() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn(config("https://b.example", dir.path())).await;
    seed(
        &server.state.store,
        &[
            "https://b.example/blog/one",
            "https://b.example/blog/two?x=1",
            "https://b.example/about",
        ],
    );
    let http = client();

    let resp = http
        .post(server.url(&format!("/admin/purge?token={ADMIN_TOKEN}&q=/blog/&partial=true")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 2);
    assert!(server.state.store.get("https://b.example/about").is_some());

    let resp = http
        .post(server.url("/admin/purge"))
        .header("x-admin-token", ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.text().await.unwrap(), "missing url");
}

#[tokio::test]
async fn warm_job_runs_and_reports_status() {
    let upstream = MockServer::start().await;
    let base = upstream.uri();
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"><url><loc>{base}/p1</loc></url><url><loc>{base}/p2</loc></url></urlset>"#
            )
            .into_bytes(),
            "application/xml",
        ))
        .mount(&upstream)
        .await;
    for page in ["/p1", "/p2"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"<p>hi</p>".to_vec(), "text/html"))
            .expect(1)
            .mount(&upstream)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let server = spawn(config(&base, dir.path())).await;
    let http = client();

    let resp = http
        .post(server.url("/admin/sitemap-cache"))
        .json(&json!({
            "sitemap_url": format!("{base}/sitemap.xml"),
            "max_urls": 10,
            "token": ADMIN_TOKEN,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let accepted: Value = resp.json().await.unwrap();
    assert_eq!(accepted["job_id"], "job-1");
    assert_eq!(accepted["state"], "queued");
    assert_eq!(accepted["status_url"], "/admin/sitemap-cache/status?job=job-1");

    let status_url = server.url(accepted["status_url"].as_str().unwrap());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let done = loop {
        let snap: Value = http
            .get(&status_url)
            .header("x-admin-token", ADMIN_TOKEN)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if snap["state"] == "completed" || snap["state"] == "error" {
            break snap;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never finished");
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    assert_eq!(done["state"], "completed");
    assert_eq!(done["total_urls"], 2);
    assert_eq!(done["cached_urls"], 2);
    assert_eq!(done["max_urls"], 10);
    assert_eq!(done["url_statuses"].as_array().unwrap().len(), 2);

    let listed: Value = http
        .get(server.url(&format!("/admin/sitemap-cache/status?token={ADMIN_TOKEN}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["jobs"].as_array().unwrap().len(), 1);
    assert_eq!(listed["jobs"][0]["job_id"], "job-1");
}

#[tokio::test]
async fn warm_job_form_input_and_bad_requests() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn(config("http://127.0.0.1:9", dir.path())).await;
    let http = client();

    let resp = http
        .post(server.url("/admin/sitemap-cache"))
        .header("x-admin-token", ADMIN_TOKEN)
        .form(&[("sitemap_url", "   ")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.text().await.unwrap(), "missing sitemap_url");

    let resp = http
        .post(server.url("/admin/sitemap-cache"))
        .header("content-type", "application/json")
        .header("x-admin-token", ADMIN_TOKEN)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.text().await.unwrap(), "invalid json");

    let resp = http
        .post(server.url("/admin/sitemap-cache"))
        .form(&[
            ("sitemap_url", "http://127.0.0.1:9/sitemap.xml"),
            ("max_urls", "3"),
            ("token", ADMIN_TOKEN),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let resp = http
        .get(server.url("/admin/sitemap-cache/status?job_id=job-9"))
        .header("x-admin-token", ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.unwrap(), "job not found");
}
