use crate::error::{RerouterError, Result};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use url::Url;

/// Maps an absolute URL to its cache file under `root`.
///
/// Layout is `<root>/<host[:port]>/<segments...>/index.json`. A non-empty
/// query selects `index.<digest>.json` instead, where the digest is the first
/// four bytes of SHA-1 over `path?query`, hex encoded.
pub fn cache_path_for_url(root: &Path, raw_url: &str) -> Result<PathBuf> {
    let url = Url::parse(raw_url).map_err(|e| RerouterError::invalid_url(raw_url, e))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RerouterError::invalid_url(raw_url, url::ParseError::EmptyHost))?;

    let mut dir = match url.port() {
        Some(port) => root.join(format!("{host}:{port}")),
        None => root.join(host),
    };
    for segment in url.path().split('/').filter(|s| !s.is_empty()) {
        dir.push(segment);
    }

    let file = match url.query() {
        Some(query) if !query.is_empty() => {
            format!("index.{}.json", request_uri_digest(url.path(), query))
        }
        _ => "index.json".to_string(),
    };
    Ok(dir.join(file))
}

fn request_uri_digest(path: &str, query: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(path.as_bytes());
    hasher.update(b"?");
    hasher.update(query.as_bytes());
    hasher.finalize()[..4]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
