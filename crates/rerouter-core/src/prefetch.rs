//! Background cache warming for pages humans were redirected away from.

use crate::cache::{cacheable_headers, strip_validators, CacheEntry, CacheStore, HEADER_CONTENT_TYPE};
use crate::error::{RerouterError, Result};
use crate::net::{HttpClient, InFlightGuard, InFlightSet, UpstreamRequest};
use crate::rewrite::rewrite_body;
use crate::ttl::ttl_for_path;
use rerouter_config::{CacheConfig, Config};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use url::Url;

pub const PREFETCH_USER_AGENT: &str = "Mozilla/5.0 (compatible; Prefetcher)";
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A fresh 200 entry was already cached; nothing was fetched.
    CacheHitFresh,
    /// Fetched from upstream and stored.
    Fetched,
    /// Another caller is fetching the same URL right now.
    InFlightElsewhere,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchJob {
    pub target: String,
    /// Proxy base to rewrite upstream links to. `None` stores the body as is.
    pub rewrite_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PrefetchSettings {
    pub upstream_base: String,
    pub cache: CacheConfig,
    pub queue_capacity: usize,
}

impl PrefetchSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            upstream_base: cfg.b_base_url.clone(),
            cache: cfg.cache.clone(),
            queue_capacity: cfg.prefetch.queue_capacity,
        }
    }
}

struct Queued {
    job: PrefetchJob,
    _claim: InFlightGuard,
}

struct Shared {
    settings: PrefetchSettings,
    store: CacheStore,
    http: Arc<dyn HttpClient>,
    in_flight: InFlightSet,
}

/// Bounded queue drained by a fixed pool of workers.
///
/// Each URL is fetched by at most one job at a time; the in-flight claim
/// travels with the queued job and is released once a worker is done with it.
#[derive(Clone)]
pub struct Prefetcher {
    shared: Arc<Shared>,
    tx: mpsc::Sender<Queued>,
    rx: Arc<Mutex<mpsc::Receiver<Queued>>>,
    started: Arc<AtomicBool>,
}

impl Prefetcher {
    pub fn new(settings: PrefetchSettings, store: CacheStore, http: Arc<dyn HttpClient>) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                settings,
                store,
                http,
                in_flight: InFlightSet::new(),
            }),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the worker pool. Must run inside a tokio runtime; later calls
    /// are ignored.
    pub fn start(&self, workers: usize) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("prefetcher already started");
            return;
        }
        let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };
        for id in 0..workers {
            let shared = self.shared.clone();
            let rx = self.rx.clone();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(queued) = next else {
                        break;
                    };
                    // failures are logged inside handle
                    let _ = shared.handle(&queued.job).await;
                }
                debug!(worker = id, "prefetch worker stopped");
            });
        }
    }

    /// Queues `target` for background fetching.
    ///
    /// Returns false when the URL is already in flight or the queue is full;
    /// neither case is an error.
    pub fn enqueue(&self, target: &str, rewrite_base: Option<&str>) -> bool {
        let Some(claim) = self.shared.in_flight.try_claim(target) else {
            return false;
        };
        let queued = Queued {
            job: PrefetchJob {
                target: target.to_string(),
                rewrite_base: rewrite_base.map(str::to_string),
            },
            _claim: claim,
        };
        match self.tx.try_send(queued) {
            Ok(()) => true,
            Err(_) => {
                // the rejected job drops its claim with it
                debug!(url = target, "prefetch queue full, dropping");
                false
            }
        }
    }

    /// Fetches and stores `target` on the caller's task.
    ///
    /// If the URL is already being fetched elsewhere this returns
    /// [`FetchOutcome::InFlightElsewhere`] immediately and does no work.
    pub async fn fetch_and_store(
        &self,
        target: &str,
        rewrite_base: Option<&str>,
    ) -> Result<FetchOutcome> {
        if target.is_empty() {
            return Err(RerouterError::EmptyTarget);
        }
        let Some(_claim) = self.shared.in_flight.try_claim(target) else {
            return Ok(FetchOutcome::InFlightElsewhere);
        };
        let job = PrefetchJob {
            target: target.to_string(),
            rewrite_base: rewrite_base.map(str::to_string),
        };
        self.shared.handle(&job).await
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.shared.in_flight
    }

    pub fn store(&self) -> &CacheStore {
        &self.shared.store
    }
}

impl Shared {
    async fn handle(&self, job: &PrefetchJob) -> Result<FetchOutcome> {
        if let Some(entry) = self.store.get(&job.target) {
            if entry.status == 200 {
                return Ok(FetchOutcome::CacheHitFresh);
            }
        }

        let req = UpstreamRequest::get(&job.target).user_agent(PREFETCH_USER_AGENT);
        let resp = match self.http.send(req).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url = %job.target, error = %e, "prefetch_fetch_error");
                return Err(e);
            }
        };
        if resp.status != 200 {
            warn!(url = %job.target, status = resp.status, "prefetch_unexpected_status");
            return Err(RerouterError::HttpStatus {
                url: job.target.clone(),
                status: resp.status,
            });
        }

        let mut header = cacheable_headers(&resp.headers);
        let mut body = resp.body;
        let content_type = header.get(HEADER_CONTENT_TYPE).cloned().unwrap_or_default();
        if let Some(rewritten) = self.rewrite(job, &content_type, &body) {
            body = rewritten;
            strip_validators(&mut header);
        }

        let ttl = Url::parse(&job.target)
            .map(|u| ttl_for_path(&self.settings.cache, u.path()))
            .unwrap_or(self.settings.cache.ttl_seconds);
        let entry = CacheEntry::new(job.target.clone(), 200, header, body, ttl);
        if let Err(e) = self.store.put(&job.target, &entry) {
            warn!(url = %job.target, error = %e, "prefetch_cache_write_error");
            return Err(e);
        }
        debug!(url = %job.target, ttl_seconds = ttl, source = "prefetch", "cache_store");
        Ok(FetchOutcome::Fetched)
    }

    fn rewrite(&self, job: &PrefetchJob, content_type: &str, body: &[u8]) -> Option<Vec<u8>> {
        let proxy = Url::parse(job.rewrite_base.as_deref()?).ok()?;
        let upstream = Url::parse(&self.settings.upstream_base).ok()?;
        match rewrite_body(body, content_type, &proxy, &upstream) {
            (out, true) => Some(out.into_owned()),
            _ => None,
        }
    }
}
