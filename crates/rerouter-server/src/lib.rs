use anyhow::Context;
use axum::{
    middleware,
    routing::{any, get, post},
    Router,
};
use rerouter_config::Config;
use rerouter_core::prefetch::{PrefetchSettings, Prefetcher};
use rerouter_core::warm::{JobRegistry, WarmJobManager, WarmSettings};
use rerouter_core::{CacheStore, HttpClient, ReqwestHttpClient, SitemapCollector};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod access_log;
pub mod admin;
pub mod proxy;

pub struct AppState {
    pub config: Config,
    pub upstream: Url,
    pub store: CacheStore,
    pub http: Arc<dyn HttpClient>,
    pub prefetcher: Prefetcher,
    pub warm: WarmJobManager,
}

impl AppState {
    /// Wires the core components from `config` and starts the prefetch
    /// workers, so it must be called from within a tokio runtime.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let upstream = Url::parse(&config.b_base_url)
            .with_context(|| format!("invalid b_base_url {:?}", config.b_base_url))?;
        let store = CacheStore::new(&config.cache.dir);

        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(Duration::from_secs(
            config.prefetch.timeout_secs,
        ))?);
        let sitemap_http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(
            Duration::from_secs(config.sitemap.fetch_timeout_secs),
        )?);

        let prefetcher = Prefetcher::new(
            PrefetchSettings::from_config(&config),
            store.clone(),
            http.clone(),
        );
        prefetcher.start(config.prefetch.workers);

        let warm = WarmJobManager::new(
            WarmSettings::from_config(&config),
            prefetcher.clone(),
            SitemapCollector::new(sitemap_http),
            Arc::new(JobRegistry::new()),
        );

        Ok(Self {
            config,
            upstream,
            store,
            http,
            prefetcher,
            warm,
        })
    }

    /// Upstream URL for a request-URI on this proxy.
    pub fn upstream_url(&self, request_uri: &str) -> String {
        format!("{}{}", self.config.b_base_url.trim_end_matches('/'), request_uri)
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/robots.txt", any(proxy::robots))
        .route("/admin/purge", post(admin::purge).delete(admin::purge))
        .route("/admin/sitemap-cache", post(admin::start_warm_job))
        .route("/admin/sitemap-cache/status", get(admin::warm_job_status))
        .fallback(proxy::proxy)
        .layer(middleware::from_fn(access_log::access_log))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
