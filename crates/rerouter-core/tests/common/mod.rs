#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use rerouter_config::CacheConfig;
use rerouter_core::prefetch::{PrefetchSettings, Prefetcher};
use rerouter_core::warm::{JobRegistry, JobSnapshot, WarmJobManager, WarmSettings};
use rerouter_core::{CacheStore, HttpClient, ReqwestHttpClient, SitemapCollector};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn http() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestHttpClient::new(Duration::from_secs(5)).unwrap())
}

pub fn prefetcher(upstream: &str, root: &Path, queue_capacity: usize) -> Prefetcher {
    let settings = PrefetchSettings {
        upstream_base: upstream.to_string(),
        cache: CacheConfig::default(),
        queue_capacity,
    };
    Prefetcher::new(settings, CacheStore::new(root), http())
}

pub fn manager(upstream: &str, root: &Path, job_timeout: Duration) -> WarmJobManager {
    manager_with_delay(upstream, root, job_timeout, Duration::ZERO)
}

pub fn manager_with_delay(
    upstream: &str,
    root: &Path,
    job_timeout: Duration,
    delay: Duration,
) -> WarmJobManager {
    let settings = WarmSettings {
        upstream_base: upstream.to_string(),
        proxy_base: None,
        delay,
        job_timeout,
        max_attempts: 3,
    };
    WarmJobManager::new(
        settings,
        prefetcher(upstream, root, 16),
        SitemapCollector::new(http()),
        Arc::new(JobRegistry::new()),
    )
}

/// Polls until the job reaches `completed` or `error`.
pub async fn wait_for_terminal(manager: &WarmJobManager, job_id: &str) -> JobSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let snap = manager.snapshot(job_id).expect("job registered");
        if snap.state.is_terminal() {
            return snap;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} stuck in {:?}",
            snap.state
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn urlset(locs: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!("<url><loc>{loc}</loc></url>"));
    }
    xml.push_str("</urlset>");
    xml
}

pub fn sitemap_index(locs: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!("<sitemap><loc>{loc}</loc></sitemap>"));
    }
    xml.push_str("</sitemapindex>");
    xml
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}
