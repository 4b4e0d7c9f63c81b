use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlOutcome {
    Cached,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ParseError,
    HostMismatch,
    Duplicate,
    FetchFailed,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::HostMismatch => "host_mismatch",
            Self::Duplicate => "duplicate",
            Self::FetchFailed => "fetch_failed",
        }
    }
}

/// What happened to one URL of a warm job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlStatus {
    pub raw_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub status: UrlOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_host: Option<String>,
}

impl UrlStatus {
    fn new(raw_url: &str, status: UrlOutcome) -> Self {
        Self {
            raw_url: raw_url.to_string(),
            url: None,
            status,
            reason: None,
            attempts: None,
            error: None,
            expected_host: None,
            actual_host: None,
        }
    }

    pub fn cached(raw_url: &str, url: &str, attempts: u32) -> Self {
        Self {
            url: Some(url.to_string()),
            attempts: Some(attempts),
            ..Self::new(raw_url, UrlOutcome::Cached)
        }
    }

    pub fn skipped(raw_url: &str, reason: SkipReason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::new(raw_url, UrlOutcome::Skipped)
        }
    }

    pub fn failed(raw_url: &str, url: &str, attempts: u32, error: Option<String>) -> Self {
        Self {
            url: Some(url.to_string()),
            reason: Some(SkipReason::FetchFailed),
            attempts: Some(attempts),
            error,
            ..Self::new(raw_url, UrlOutcome::Failed)
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_hosts(mut self, expected: &str, actual: &str) -> Self {
        self.expected_host = Some(expected.to_string());
        self.actual_host = Some(actual.to_string());
        self
    }
}

/// Point-in-time copy of a job, as served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub sitemap_url: String,
    pub state: JobState,
    pub total_urls: usize,
    pub processed_urls: usize,
    pub cached_urls: usize,
    pub skipped_urls: usize,
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub max_urls: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_base_url_override: Option<String>,
    #[serde(default)]
    pub url_statuses: Vec<UrlStatus>,
}

#[derive(Debug)]
struct Progress {
    state: JobState,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    total: usize,
    processed: usize,
    cached: usize,
    skipped: usize,
    interrupted: bool,
    error: Option<String>,
    url_statuses: Vec<UrlStatus>,
}

impl Progress {
    fn finish(&mut self, state: JobState) {
        self.state = state;
        self.completed_at = Some(Utc::now());
    }
}

/// One sitemap warming run. Only the manager mutates it.
#[derive(Debug)]
pub struct WarmJob {
    seq: u64,
    id: String,
    sitemap_url: String,
    max_urls: i64,
    rewrite_base_override: Option<String>,
    progress: Mutex<Progress>,
}

impl WarmJob {
    pub fn new(seq: u64, sitemap_url: &str, max_urls: i64, rewrite_base_override: Option<String>) -> Self {
        Self {
            seq,
            id: format!("job-{seq}"),
            sitemap_url: sitemap_url.to_string(),
            max_urls,
            rewrite_base_override,
            progress: Mutex::new(Progress {
                state: JobState::Queued,
                submitted_at: Utc::now(),
                started_at: None,
                completed_at: None,
                total: 0,
                processed: 0,
                cached: 0,
                skipped: 0,
                interrupted: false,
                error: None,
                url_statuses: Vec::new(),
            }),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sitemap_url(&self) -> &str {
        &self.sitemap_url
    }

    pub fn max_urls(&self) -> i64 {
        self.max_urls
    }

    pub fn rewrite_base_override(&self) -> Option<&str> {
        self.rewrite_base_override.as_deref()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let p = self.lock();
        let duration_ms = match (p.started_at, p.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds(),
            _ => 0,
        };
        JobSnapshot {
            job_id: self.id.clone(),
            sitemap_url: self.sitemap_url.clone(),
            state: p.state,
            total_urls: p.total,
            processed_urls: p.processed,
            cached_urls: p.cached,
            skipped_urls: p.skipped,
            interrupted: p.interrupted,
            error: p.error.clone(),
            submitted_at: p.submitted_at,
            started_at: p.started_at,
            completed_at: p.completed_at,
            duration_ms,
            max_urls: self.max_urls,
            a_base_url_override: self.rewrite_base_override.clone(),
            url_statuses: p.url_statuses.clone(),
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut p = self.lock();
        p.state = JobState::Running;
        p.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&self) {
        self.lock().finish(JobState::Completed);
    }

    pub(crate) fn mark_error(&self, error: impl Into<String>) {
        let mut p = self.lock();
        p.error = Some(error.into());
        p.finish(JobState::Error);
    }

    pub(crate) fn set_total(&self, total: usize) {
        self.lock().total = total;
    }

    pub(crate) fn set_interrupted(&self) {
        self.lock().interrupted = true;
    }

    /// Counts a URL that was handed to the fetcher.
    pub(crate) fn begin_fetch(&self) {
        self.lock().processed += 1;
    }

    /// Counts a URL that was skipped before any fetch.
    pub(crate) fn record_skip(&self, status: UrlStatus) {
        let mut p = self.lock();
        p.processed += 1;
        p.skipped += 1;
        p.url_statuses.push(status);
    }

    pub(crate) fn record_cached(&self, status: UrlStatus) {
        let mut p = self.lock();
        p.cached += 1;
        p.url_statuses.push(status);
    }

    pub(crate) fn record_failed(&self, status: UrlStatus) {
        let mut p = self.lock();
        p.skipped += 1;
        p.url_statuses.push(status);
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
