use super::{cache_path_for_url, CacheEntry};
use crate::error::Result;
use crate::util::{now_unix, write_atomic};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

/// Filesystem-backed response cache keyed by absolute URL.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

/// Outcome of a purge request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeResult {
    pub deleted: usize,
    pub files: Vec<String>,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, url: &str) -> Result<PathBuf> {
        cache_path_for_url(&self.root, url)
    }

    /// Returns the live entry for `url`. Missing, unreadable, undecodable and
    /// expired files are all misses; expired files stay on disk.
    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        self.get_at(url, now_unix())
    }

    pub fn get_at(&self, url: &str, now: i64) -> Option<CacheEntry> {
        let path = self.path_for(url).ok()?;
        let bytes = fs::read(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cache_entry_undecodable");
                return None;
            }
        };
        if entry.is_expired_at(now) {
            return None;
        }
        Some(entry)
    }

    /// Persists `entry` at the path derived from `url`.
    pub fn put(&self, url: &str, entry: &CacheEntry) -> Result<PathBuf> {
        let path = self.path_for(url)?;
        let bytes = serde_json::to_vec(entry)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Removes the single file derived from `url`.
    pub fn purge_exact(&self, url: &str) -> Result<PurgeResult> {
        let path = self.path_for(url)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(PurgeResult {
                deleted: 1,
                files: vec![path.display().to_string()],
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PurgeResult::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every entry whose stored URL contains `raw` or `absolute`.
    /// Blank needles never match.
    pub fn purge_partial(&self, raw: &str, absolute: &str) -> PurgeResult {
        let mut result = PurgeResult::default();
        for path in self.list_all() {
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
                continue;
            };
            let hit = (!raw.is_empty() && entry.url.contains(raw))
                || (!absolute.is_empty() && entry.url.contains(absolute));
            if !hit {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    result.deleted += 1;
                    result.files.push(path.display().to_string());
                }
                Err(e) => debug!(path = %path.display(), error = %e, "cache_purge_remove_failed"),
            }
        }
        result
    }

    /// Lazily walks the cache root, yielding every `*.json` file.
    pub fn list_all(&self) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "cache_walk_error");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            })
            .map(|entry| entry.into_path())
    }
}
