pub mod atomic_write;

pub use atomic_write::write_atomic;

use std::time::{Duration, SystemTime};
use url::Url;

/// Current wall clock as unix seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64
}

/// `host[:port]` of `url`, with the port only when it is not the scheme default.
pub fn url_authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}
