mod path;
pub mod purge;
mod store;

pub use path::cache_path_for_url;
pub use purge::{purge, resolve_purge_target};
pub use store::{CacheStore, PurgeResult};

use crate::util::now_unix;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_LAST_MODIFIED: &str = "Last-Modified";
pub const HEADER_ETAG: &str = "ETag";

/// Response headers worth persisting next to a cached body.
pub const CACHED_HEADERS: [&str; 3] = [HEADER_CONTENT_TYPE, HEADER_LAST_MODIFIED, HEADER_ETAG];

/// One cached upstream response, stored as `index[.<digest>].json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub status: u16,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub header: BTreeMap<String, String>,
    #[serde(default, with = "body_base64")]
    pub body: Vec<u8>,
}

impl CacheEntry {
    /// Builds an entry created now that lives for `ttl_seconds`.
    pub fn new(
        url: impl Into<String>,
        status: u16,
        header: BTreeMap<String, String>,
        body: Vec<u8>,
        ttl_seconds: u64,
    ) -> Self {
        let created_at = now_unix();
        Self {
            url: url.into(),
            created_at,
            expires_at: created_at.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
            status,
            header,
            body,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header.get(HEADER_CONTENT_TYPE).map(String::as_str)
    }
}

/// Copies the allow-listed headers out of an upstream response.
pub fn cacheable_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    CACHED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            (!value.is_empty()).then(|| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// Drops validators that no longer describe a rewritten body.
pub fn strip_validators(header: &mut BTreeMap<String, String>) {
    header.remove(HEADER_LAST_MODIFIED);
    header.remove(HEADER_ETAG);
}

fn null_as_empty<'de, D>(d: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::deserialize(d)?.unwrap_or_default())
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        // empty bodies may be written as null
        let encoded: Option<String> = Option::deserialize(d)?;
        match encoded {
            Some(s) => STANDARD.decode(s).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
