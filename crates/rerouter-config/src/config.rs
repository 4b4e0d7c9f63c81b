use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Origin site being mirrored, e.g. `https://b.example.com`.
    #[serde(default)]
    pub b_base_url: String,
    /// Public base of this proxy. Derived per request when unset.
    #[serde(default)]
    pub a_base_url: Option<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_redirect_status")]
    pub redirect_status: u16,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub prefetch: PrefetchConfig,
    #[serde(default)]
    pub sitemap: SitemapConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            b_base_url: String::new(),
            a_base_url: None,
            listen_addr: default_listen_addr(),
            redirect_status: default_redirect_status(),
            cache: CacheConfig::default(),
            prefetch: PrefetchConfig::default(),
            sitemap: SitemapConfig::default(),
            admin: AdminConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_redirect_status() -> u16 {
    302
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Cache every 200 response served to bots. When false only `patterns` are cached.
    #[serde(default = "default_true")]
    pub cache_all: bool,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    /// Evaluated in order, first match wins.
    #[serde(default)]
    pub ttl_rules: Vec<TtlRule>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_seconds: default_ttl_seconds(),
            cache_all: true,
            patterns: default_patterns(),
            ttl_rules: Vec::new(),
        }
    }
}

fn default_cache_dir() -> String {
    "./cache".to_string()
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_patterns() -> Vec<String> {
    vec![
        "/sitemap.xml".to_string(),
        "/blog/*".to_string(),
        "/products/*".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TtlRule {
    /// Path glob (`/blog/*`) or extension suffix (`*.xml`, `.css`).
    pub pattern: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrefetchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    256
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SitemapConfig {
    /// Politeness delay between URLs of a warm job. 0 disables it.
    #[serde(default)]
    pub warm_delay_seconds: u64,
    #[serde(default = "default_sitemap_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            warm_delay_seconds: 0,
            fetch_timeout_secs: default_sitemap_timeout_secs(),
        }
    }
}

fn default_sitemap_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AdminConfig {
    /// Admin endpoints are disabled while this is unset.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Overlays environment variables on top of the file values.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("B_BASE_URL") {
            self.b_base_url = v;
        }
        if let Some(v) = get("A_BASE_URL") {
            self.a_base_url = Some(v);
        }
        if let Some(v) = get("LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = get("CACHE_DIR") {
            self.cache.dir = v;
        }
        if let Some(n) = get("CACHE_TTL_SECONDS").and_then(|v| v.trim().parse::<u64>().ok()) {
            if n > 0 {
                self.cache.ttl_seconds = n;
            }
        }
        if let Some(v) = get("CACHE_ALL") {
            match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.cache.cache_all = true,
                "0" | "false" | "no" | "off" => self.cache.cache_all = false,
                _ => {}
            }
        }
        if let Some(v) = get("CACHE_PATTERNS") {
            let patterns: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| {
                    if p.starts_with('/') {
                        p.to_string()
                    } else {
                        format!("/{p}")
                    }
                })
                .collect();
            if !patterns.is_empty() {
                self.cache.patterns = patterns;
            }
        }
        if let Some(n) = get("REDIRECT_STATUS").and_then(|v| v.trim().parse::<u16>().ok()) {
            if (300..400).contains(&n) {
                self.redirect_status = n;
            }
        }
        if let Some(v) = get("ADMIN_TOKEN") {
            self.admin.token = Some(v);
        }
        if let Some(n) = get("SITEMAP_WARM_DELAY_SECONDS").and_then(|v| v.trim().parse().ok()) {
            self.sitemap.warm_delay_seconds = n;
        }
        if let Some(n) = get("PREFETCH_WORKERS").and_then(|v| v.trim().parse().ok()) {
            self.prefetch.workers = n;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log.level = v;
        }
    }

    /// Configured admin token, treating an empty string as unset.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin.token.as_deref().filter(|t| !t.is_empty())
    }
}
