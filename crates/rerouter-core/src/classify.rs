use glob::{MatchOptions, Pattern};

/// Crawler and link-preview agents whose UA carries none of the generic
/// `bot` / `crawl` / `spider` markers. Lowercase.
const KNOWN_AGENTS: &[&str] = &[
    // google
    "mediapartners-google",
    "apis-google",
    "feedfetcher-google",
    "google-inspectiontool",
    "googleother",
    "duplexweb-google",
    "googleweblight",
    "google-proxy",
    "google favicon",
    "google-read-aloud",
    "google-extended",
    // bing, yahoo, yandex and friends
    "bingpreview",
    "bingurlpreview",
    "slurp",
    "yandeximages",
    "yandexnews",
    "yandexvideo",
    "sogou",
    "qwantify",
    "naver-yeti",
    "yeti",
    // link previews
    "facebookexternalhit",
    "facebookcatalog",
    "meta-externalagent",
    "slack-imgproxy",
    "skypeuripreview",
    "whatsapp",
    "vkshare",
    // seo tools and archives
    "megaindex",
    "siteexplorer",
    "barkrowler",
    "sistrix",
    "ezooms",
    "ia_archiver",
    "heritrix",
    "nutch",
    "twingly",
    // auditors
    "lighthouse",
    "pagespeed",
    "ptst",
    "gtmetrix",
    "speedcurve",
    "pingdom",
    "siteimprove",
    "validator",
    // headless renderers
    "headlesschrome",
    "phantomjs",
    "puppeteer",
    "rendertron",
    "prerender",
    "claude-web",
];

/// True when `user_agent` looks like a crawler or a preview fetcher.
pub fn is_bot(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    if ua.is_empty() {
        return false;
    }
    if ua.contains("bot") || ua.contains("crawl") || ua.contains("spider") {
        return true;
    }
    KNOWN_AGENTS.iter().any(|k| ua.contains(k))
}

/// Matches a request path against cache patterns.
///
/// `*` stays within one path segment (`**` is treated as `*`). A pattern that
/// ends in `/` also matches every path below it.
pub fn patterns_match<S: AsRef<str>>(patterns: &[S], path: &str) -> bool {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let opts = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    patterns.iter().any(|raw| {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return false;
        }
        let pattern = raw.replace("**", "*");
        let globbed = Pattern::new(&pattern)
            .map(|p| p.matches_with(&path, opts))
            .unwrap_or(false);
        globbed || (pattern.ends_with('/') && path.starts_with(&pattern))
    })
}

pub fn is_sitemap_path(path: &str) -> bool {
    path.to_ascii_lowercase().contains("sitemap")
}
