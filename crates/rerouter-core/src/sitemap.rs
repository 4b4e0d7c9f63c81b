//! Sitemap discovery: follows sitemap indexes and collects page URLs.

use crate::error::{RerouterError, Result};
use crate::net::{HttpClient, UpstreamRequest, UpstreamResponse};
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

pub const SITEMAP_USER_AGENT: &str = "rerouter-sitemap-fetcher/1.0";
pub const DEFAULT_SITEMAP_URL_LIMIT: usize = 5000;

/// Parsed shape of one sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<urlset>`: page locations.
    UrlSet(Vec<String>),
    /// `<sitemapindex>`: child sitemap locations.
    Index(Vec<String>),
}

pub struct SitemapCollector {
    http: Arc<dyn HttpClient>,
}

impl SitemapCollector {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Collects unique page URLs reachable from `sitemap_url`, depth first.
    ///
    /// Stops successfully once `max_urls` URLs are known; a non-positive
    /// limit means [`DEFAULT_SITEMAP_URL_LIMIT`]. A document that cannot be
    /// fetched or parsed aborts the whole walk. A single bad `<loc>` does not:
    /// page locations that fail to resolve are returned verbatim and child
    /// sitemaps that fail to resolve are skipped.
    pub async fn collect(&self, sitemap_url: &str, max_urls: i64) -> Result<Vec<String>> {
        let limit = effective_limit(max_urls);
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut urls = Vec::new();
        let mut stack = vec![sitemap_url.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let body = self.fetch_document(&current).await?;
            match parse_sitemap(&body, &current)? {
                SitemapDocument::UrlSet(locs) => {
                    for loc in locs {
                        // unresolvable entries go through raw; the warm job skips them
                        let resolved = match resolve_location(&current, &loc) {
                            Ok(resolved) => resolved,
                            Err(e) => {
                                warn!(sitemap = %current, loc = %loc, error = %e, "sitemap_loc_unresolvable");
                                loc
                            }
                        };
                        if !seen.insert(resolved.clone()) {
                            continue;
                        }
                        urls.push(resolved);
                        if urls.len() >= limit {
                            debug!(sitemap = sitemap_url, limit, "sitemap url limit reached");
                            return Ok(urls);
                        }
                    }
                }
                SitemapDocument::Index(locs) => {
                    let children: Vec<String> = locs
                        .iter()
                        .filter_map(|loc| match resolve_location(&current, loc) {
                            Ok(child) => Some(child),
                            Err(e) => {
                                warn!(sitemap = %current, loc = %loc, error = %e, "sitemap_child_skipped");
                                None
                            }
                        })
                        .collect();
                    // reversed so the first child is walked first
                    stack.extend(children.into_iter().rev());
                }
            }
        }
        Ok(urls)
    }

    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>> {
        let req = UpstreamRequest::get(url).user_agent(SITEMAP_USER_AGENT);
        let resp = self.http.send(req).await?;
        if resp.status != 200 {
            return Err(RerouterError::HttpStatus {
                url: url.to_string(),
                status: resp.status,
            });
        }
        if !is_gzip_encoded(&resp, url) {
            return Ok(resp.body);
        }
        let mut decoded = Vec::new();
        GzDecoder::new(resp.body.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|source| RerouterError::Gzip {
                url: url.to_string(),
                source,
            })?;
        Ok(decoded)
    }
}

pub fn effective_limit(max_urls: i64) -> usize {
    if max_urls <= 0 {
        DEFAULT_SITEMAP_URL_LIMIT
    } else {
        usize::try_from(max_urls).unwrap_or(usize::MAX)
    }
}

fn is_gzip_encoded(resp: &UpstreamResponse, url: &str) -> bool {
    match resp.header("content-encoding").filter(|v| !v.is_empty()) {
        Some(enc) => enc.to_ascii_lowercase().contains("gzip"),
        None => url.to_ascii_lowercase().ends_with(".gz"),
    }
}

/// Classifies a sitemap body. Blank `<loc>` values are dropped.
pub fn parse_sitemap(body: &[u8], url: &str) -> Result<SitemapDocument> {
    let trimmed = body.trim_ascii();
    if trimmed.is_empty() {
        return Err(RerouterError::EmptySitemap(url.to_string()));
    }
    let unrecognized = || RerouterError::UnrecognizedSitemap(url.to_string());

    let text = std::str::from_utf8(trimmed).map_err(|_| unrecognized())?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let doc = roxmltree::Document::parse(text).map_err(|e| {
        debug!(sitemap = url, error = %e, "sitemap xml parse failed");
        unrecognized()
    })?;
    let root = doc.root_element();

    let pages = child_locs(root, "url");
    if pages.entries > 0 {
        return Ok(SitemapDocument::UrlSet(pages.locs));
    }
    let children = child_locs(root, "sitemap");
    if children.entries > 0 {
        return Ok(SitemapDocument::Index(children.locs));
    }
    Err(unrecognized())
}

struct Locs {
    entries: usize,
    locs: Vec<String>,
}

fn child_locs(root: roxmltree::Node<'_, '_>, element: &str) -> Locs {
    let mut out = Locs {
        entries: 0,
        locs: Vec::new(),
    };
    for entry in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == element)
    {
        out.entries += 1;
        let loc: String = entry
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "loc")
            .flat_map(|n| n.descendants())
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect();
        let loc = loc.trim();
        if !loc.is_empty() {
            out.locs.push(loc.to_string());
        }
    }
    out
}

/// Resolves `loc` against the sitemap it came from and drops the fragment.
pub fn resolve_location(base: &str, loc: &str) -> Result<String> {
    let base_url = Url::parse(base).map_err(|e| RerouterError::invalid_url(base, e))?;
    let mut resolved = base_url
        .join(loc.trim())
        .map_err(|e| RerouterError::invalid_url(loc, e))?;
    resolved.set_fragment(None);
    Ok(resolved.to_string())
}
