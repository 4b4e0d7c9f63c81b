use crate::classify::patterns_match;
use rerouter_config::CacheConfig;

/// Lifetime in seconds for a cached response at `path`.
///
/// Rules are tried in order and the first matching rule with a positive TTL
/// wins. Patterns starting with `*.` or `.` match the file extension,
/// ignoring case; anything else is a path pattern.
pub fn ttl_for_path(cache: &CacheConfig, path: &str) -> u64 {
    let lower_path = path.to_ascii_lowercase();
    for rule in &cache.ttl_rules {
        if rule.ttl_seconds == 0 {
            continue;
        }
        let pattern = rule.pattern.as_str();
        let matched = match extension_suffix(pattern) {
            Some(ext) => lower_path.ends_with(&format!(".{}", ext.to_ascii_lowercase())),
            None => patterns_match(&[pattern], path),
        };
        if matched {
            return rule.ttl_seconds;
        }
    }
    cache.ttl_seconds
}

fn extension_suffix(pattern: &str) -> Option<&str> {
    pattern
        .strip_prefix("*.")
        .or_else(|| pattern.strip_prefix('.'))
}
