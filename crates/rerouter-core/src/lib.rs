pub mod cache;
pub mod classify;
pub mod error;
pub mod net;
pub mod prefetch;
pub mod rewrite;
pub mod sitemap;
pub mod ttl;
pub mod util;
pub mod warm;

pub use cache::{CacheEntry, CacheStore, PurgeResult};
pub use classify::{is_bot, is_sitemap_path, patterns_match};
pub use error::{RerouterError, Result};
pub use net::{HttpClient, ReqwestHttpClient, UpstreamRequest, UpstreamResponse};
pub use prefetch::{FetchOutcome, PrefetchJob, PrefetchSettings, Prefetcher};
pub use rewrite::{rewrite_body, rewrite_hosts};
pub use sitemap::SitemapCollector;
pub use ttl::ttl_for_path;
pub use warm::{JobRegistry, JobSnapshot, JobState, WarmJobManager, WarmSettings};
