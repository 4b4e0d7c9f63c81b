use super::job::WarmJob;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// In-memory table of warm jobs, kept for the process lifetime.
#[derive(Debug, Default)]
pub struct JobRegistry {
    seq: AtomicU64,
    jobs: RwLock<BTreeMap<u64, Arc<WarmJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next job sequence number, starting at 1.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn insert(&self, job: Arc<WarmJob>) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.seq(), job);
    }

    /// Looks a job up by its `job-<n>` id.
    ///
    /// Only the canonical spelling matches; `job-01` or `job-+1` do not.
    pub fn get(&self, id: &str) -> Option<Arc<WarmJob>> {
        let seq: u64 = id.strip_prefix("job-")?.parse().ok()?;
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&seq)
            .filter(|job| job.id() == id)
            .cloned()
    }

    /// All jobs in submission order.
    pub fn list(&self) -> Vec<Arc<WarmJob>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
