use super::{CacheStore, PurgeResult};
use crate::error::{RerouterError, Result};
use tracing::info;
use url::Url;

/// Turns an admin purge query into an absolute upstream URL.
///
/// Anything that parses with a scheme is taken as-is; everything else is a
/// path on the upstream.
pub fn resolve_purge_target(upstream_base: &str, q: &str) -> String {
    if Url::parse(q).is_ok() {
        return q.to_string();
    }
    let base = upstream_base.trim_end_matches('/');
    if q.starts_with('/') {
        format!("{base}{q}")
    } else {
        format!("{base}/{q}")
    }
}

pub fn purge(store: &CacheStore, upstream_base: &str, q: &str, partial: bool) -> Result<PurgeResult> {
    let q = q.trim();
    if q.is_empty() {
        return Err(RerouterError::MissingField("url"));
    }
    let absolute = resolve_purge_target(upstream_base, q);

    let result = if partial {
        store.purge_partial(q, &absolute)
    } else {
        store.purge_exact(&absolute)?
    };
    info!(
        query = q,
        target = %absolute,
        partial,
        deleted = result.deleted,
        "cache_purged"
    );
    Ok(result)
}
