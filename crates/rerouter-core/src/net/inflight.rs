use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Set of URLs currently being fetched.
///
/// A claim is held by an [`InFlightGuard`]; dropping the guard (normal
/// completion, error, or a cancelled future) releases the URL.
#[derive(Clone, Default)]
pub struct InFlightSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, or returns `None` when someone else already holds it.
    pub fn try_claim(&self, key: &str) -> Option<InFlightGuard> {
        if !self.lock().insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.inner.clone(),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
