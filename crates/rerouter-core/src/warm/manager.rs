use super::job::{JobSnapshot, SkipReason, UrlStatus, WarmJob};
use super::registry::JobRegistry;
use crate::error::{RerouterError, Result};
use crate::prefetch::Prefetcher;
use crate::sitemap::SitemapCollector;
use crate::util::url_authority;
use rerouter_config::Config;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(72 * 60 * 60);
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct WarmSettings {
    pub upstream_base: String,
    /// Configured proxy base; jobs without an override rewrite to this.
    pub proxy_base: Option<String>,
    /// Pause between two URLs of a job.
    pub delay: Duration,
    pub job_timeout: Duration,
    pub max_attempts: u32,
}

impl WarmSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            upstream_base: cfg.b_base_url.clone(),
            proxy_base: cfg
                .a_base_url
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            delay: Duration::from_secs(cfg.sitemap.warm_delay_seconds),
            job_timeout: DEFAULT_JOB_TIMEOUT,
            max_attempts: MAX_FETCH_ATTEMPTS,
        }
    }
}

struct Inner {
    settings: WarmSettings,
    prefetcher: Prefetcher,
    collector: SitemapCollector,
    registry: Arc<JobRegistry>,
}

/// Runs sitemap warm jobs in the background and answers status queries.
#[derive(Clone)]
pub struct WarmJobManager {
    inner: Arc<Inner>,
}

impl WarmJobManager {
    pub fn new(
        settings: WarmSettings,
        prefetcher: Prefetcher,
        collector: SitemapCollector,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                prefetcher,
                collector,
                registry,
            }),
        }
    }

    /// Registers a job and starts it on its own task.
    ///
    /// The returned snapshot is always `queued`.
    pub fn start_job(
        &self,
        sitemap_url: &str,
        max_urls: i64,
        rewrite_base_override: Option<&str>,
    ) -> Result<JobSnapshot> {
        let sitemap_url = sitemap_url.trim();
        if sitemap_url.is_empty() {
            return Err(RerouterError::MissingField("sitemap_url"));
        }
        let rewrite_base_override = rewrite_base_override
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let registry = &self.inner.registry;
        let job = Arc::new(WarmJob::new(
            registry.next_seq(),
            sitemap_url,
            max_urls,
            rewrite_base_override,
        ));
        registry.insert(job.clone());
        info!(
            job_id = job.id(),
            sitemap = sitemap_url,
            max_urls,
            rewrite_base = job.rewrite_base_override().unwrap_or_default(),
            "sitemap_cache_job_enqueued"
        );

        let snapshot = job.snapshot();
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run(job).await });
        Ok(snapshot)
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        self.inner.registry.get(job_id).map(|job| job.snapshot())
    }

    /// Snapshots of every job, oldest first.
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.inner
            .registry
            .list()
            .iter()
            .map(|job| job.snapshot())
            .collect()
    }
}

impl Inner {
    async fn run(&self, job: Arc<WarmJob>) {
        let upstream = match Url::parse(&self.settings.upstream_base) {
            Ok(u) => u,
            Err(e) => {
                job.mark_error(format!("invalid b_base_url: {e}"));
                error!(job_id = job.id(), error = %e, "sitemap_cache_job_error");
                return;
            }
        };
        let timeout = self.settings.job_timeout;
        let deadline = Instant::now() + timeout;

        job.mark_running();
        info!(job_id = job.id(), sitemap = job.sitemap_url(), "sitemap_cache_job_started");

        let collected = timeout_at(
            deadline,
            self.collector.collect(job.sitemap_url(), job.max_urls()),
        )
        .await;
        let urls = match collected {
            Ok(Ok(urls)) => urls,
            Ok(Err(e)) => {
                job.mark_error(e.to_string());
                error!(job_id = job.id(), error = %e, "sitemap_cache_job_error");
                return;
            }
            Err(_) => {
                let e = RerouterError::Deadline(format!(
                    "sitemap collection did not finish within {}",
                    format_timeout(timeout)
                ));
                job.mark_error(e.to_string());
                error!(job_id = job.id(), error = %e, "sitemap_cache_job_error");
                return;
            }
        };
        job.set_total(urls.len());

        let rewrite_base = job
            .rewrite_base_override()
            .or(self.settings.proxy_base.as_deref());
        let expected_host = url_authority(&upstream);
        let mut seen: HashSet<String> = HashSet::new();

        'urls: for (idx, loc) in urls.iter().enumerate() {
            if Instant::now() >= deadline {
                job.set_interrupted();
                break;
            }

            let parsed = Url::parse(loc).or_else(|e| match e {
                url::ParseError::RelativeUrlWithoutBase => upstream.join(loc),
                other => Err(other),
            });
            let url = match parsed {
                Ok(u) => assume_upstream_host(u, &upstream),
                Err(e) => {
                    info!(
                        job_id = job.id(),
                        sitemap = job.sitemap_url(),
                        raw_url = %loc,
                        reason = SkipReason::ParseError.as_str(),
                        error = %e,
                        "sitemap_cache_job_url_skipped"
                    );
                    job.record_skip(
                        UrlStatus::skipped(loc, SkipReason::ParseError).with_error(e.to_string()),
                    );
                    continue;
                }
            };

            let actual_host = url_authority(&url);
            if !actual_host.eq_ignore_ascii_case(&expected_host) {
                info!(
                    job_id = job.id(),
                    sitemap = job.sitemap_url(),
                    raw_url = %loc,
                    normalized = %url,
                    reason = SkipReason::HostMismatch.as_str(),
                    expected = %expected_host,
                    actual = %actual_host,
                    "sitemap_cache_job_url_skipped"
                );
                job.record_skip(
                    UrlStatus::skipped(loc, SkipReason::HostMismatch)
                        .with_url(url.as_str())
                        .with_hosts(&expected_host, &actual_host),
                );
                continue;
            }

            let mut url = url;
            url.set_fragment(None);
            let target = url.to_string();
            if !seen.insert(target.clone()) {
                debug!(
                    job_id = job.id(),
                    sitemap = job.sitemap_url(),
                    url = %target,
                    reason = SkipReason::Duplicate.as_str(),
                    "sitemap_cache_job_url_skipped"
                );
                job.record_skip(UrlStatus::skipped(loc, SkipReason::Duplicate).with_url(&target));
                continue;
            }

            job.begin_fetch();
            let mut cached_on = None;
            let mut last_error = None;
            for attempt in 1..=self.settings.max_attempts {
                let fetch = self.prefetcher.fetch_and_store(&target, rewrite_base);
                match timeout_at(deadline, fetch).await {
                    Err(_) => {
                        job.set_interrupted();
                        break 'urls;
                    }
                    Ok(Ok(outcome)) => {
                        info!(
                            job_id = job.id(),
                            sitemap = job.sitemap_url(),
                            url = %target,
                            attempt,
                            outcome = ?outcome,
                            rewrite_base = rewrite_base.unwrap_or_default(),
                            "sitemap_cache_job_url_cached"
                        );
                        cached_on = Some(attempt);
                        break;
                    }
                    Ok(Err(e)) => {
                        debug!(job_id = job.id(), url = %target, attempt, error = %e, "sitemap_cache_job_fetch_attempt_failed");
                        last_error = Some(e.to_string());
                    }
                }
                if Instant::now() >= deadline {
                    job.set_interrupted();
                    break 'urls;
                }
            }

            match cached_on {
                Some(attempt) => job.record_cached(UrlStatus::cached(loc, &target, attempt)),
                None => {
                    warn!(
                        job_id = job.id(),
                        sitemap = job.sitemap_url(),
                        url = %target,
                        attempts = self.settings.max_attempts,
                        error = last_error.as_deref().unwrap_or_default(),
                        "sitemap_cache_job_url_failed"
                    );
                    job.record_failed(UrlStatus::failed(
                        loc,
                        &target,
                        self.settings.max_attempts,
                        last_error,
                    ));
                }
            }

            let delay = self.settings.delay;
            if !delay.is_zero() && idx + 1 < urls.len() && timeout_at(deadline, sleep(delay)).await.is_err() {
                job.set_interrupted();
                break;
            }
        }

        let snap = job.snapshot();
        if snap.interrupted {
            job.mark_error(format!(
                "job timed out after {} before processing all URLs",
                format_timeout(timeout)
            ));
            warn!(
                job_id = job.id(),
                sitemap = job.sitemap_url(),
                total = snap.total_urls,
                processed = snap.processed_urls,
                cached = snap.cached_urls,
                skipped = snap.skipped_urls,
                "sitemap_cache_job_interrupted"
            );
            return;
        }
        job.mark_completed();
        info!(
            job_id = job.id(),
            sitemap = job.sitemap_url(),
            total = snap.total_urls,
            processed = snap.processed_urls,
            cached = snap.cached_urls,
            skipped = snap.skipped_urls,
            "sitemap_cache_job_completed"
        );
    }
}

/// Hostless URLs are taken to be paths on the upstream.
fn assume_upstream_host(url: Url, upstream: &Url) -> Url {
    if url.host_str().is_some_and(|h| !h.is_empty()) {
        return url;
    }
    let mut rebuilt = upstream.clone();
    rebuilt.set_path(url.path());
    rebuilt.set_query(url.query());
    rebuilt.set_fragment(url.fragment());
    rebuilt
}

/// `72h0m0s`, `1m30s`, `250ms`.
fn format_timeout(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else if secs > 0 {
        format!("{s}s")
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_format_compactly() {
        assert_eq!(format_timeout(DEFAULT_JOB_TIMEOUT), "72h0m0s");
        assert_eq!(format_timeout(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_timeout(Duration::from_secs(5)), "5s");
        assert_eq!(format_timeout(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn hostless_urls_move_to_upstream() {
        let upstream = Url::parse("https://b.example").unwrap();
        let url = Url::parse("file:///docs/a?x=1").unwrap();
        assert_eq!(
            assume_upstream_host(url, &upstream).as_str(),
            "https://b.example/docs/a?x=1"
        );

        let other = Url::parse("https://c.example/x").unwrap();
        assert_eq!(
            assume_upstream_host(other.clone(), &upstream),
            other
        );
    }
}
