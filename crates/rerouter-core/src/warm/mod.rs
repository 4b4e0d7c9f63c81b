//! Bulk cache warming driven by sitemaps.

mod job;
mod manager;
mod registry;

pub use job::{JobSnapshot, JobState, SkipReason, UrlOutcome, UrlStatus, WarmJob};
pub use manager::{WarmJobManager, WarmSettings, DEFAULT_JOB_TIMEOUT, MAX_FETCH_ATTEMPTS};
pub use registry::JobRegistry;
