//! Crawler-facing request handling.
//!
//! Humans are redirected to the upstream and the page is warmed in the
//! background. Crawlers are served the upstream content from this origin,
//! with upstream links rewritten and cacheable responses stored on disk.

use crate::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use rerouter_core::cache::{
    cacheable_headers, strip_validators, CacheEntry, HEADER_CONTENT_TYPE, HEADER_ETAG,
    HEADER_LAST_MODIFIED,
};
use rerouter_core::rewrite::{rewrite_body, rewrite_hosts};
use rerouter_core::{
    is_bot, is_sitemap_path, patterns_match, ttl_for_path, UpstreamRequest, UpstreamResponse,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

pub const X_CACHE: &str = "x-cache";
pub const X_CACHE_GENERATED_AT: &str = "x-cache-generated-at";
pub const X_CACHE_EXPIRES_AT: &str = "x-cache-expires-at";
const ROBOTS_DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Public base URL of this proxy for the current request.
///
/// The configured `a_base_url` wins; otherwise the scheme comes from
/// `X-Forwarded-Proto` (default `http`) and the authority from `Host`.
pub fn derive_proxy_base(configured: Option<&str>, headers: &HeaderMap, uri: &Uri) -> Option<Url> {
    if let Some(base) = configured.filter(|b| !b.trim().is_empty()) {
        if let Ok(u) = Url::parse(base.trim()) {
            return Some(u);
        }
    }
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()))?;
    Url::parse(&format!("{scheme}://{host}")).ok()
}

fn request_is_bot(headers: &HeaderMap) -> bool {
    if headers.get("x-bot").and_then(|v| v.to_str().ok()) == Some("true") {
        return true;
    }
    is_bot(header_str(headers, header::USER_AGENT))
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Request as the upstream should see it: the client's UA and Accept only.
fn upstream_request(method: Method, target: &str, client_headers: &HeaderMap) -> UpstreamRequest {
    let mut req = UpstreamRequest::new(method, target)
        .user_agent(header_str(client_headers, header::USER_AGENT));
    let accept = header_str(client_headers, header::ACCEPT);
    if !accept.is_empty() {
        req = req.header(header::ACCEPT, accept);
    }
    req
}

pub async fn proxy(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let request_uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let target = state.upstream_url(&request_uri);
    let proxy_base = derive_proxy_base(state.config.a_base_url.as_deref(), &parts.headers, &parts.uri);

    if !request_is_bot(&parts.headers) && !is_sitemap_path(&path) {
        let queued = state
            .prefetcher
            .enqueue(&target, proxy_base.as_ref().map(Url::as_str));
        info!(target = %target, queued, "human_redirect");
        return redirect(state.config.redirect_status, &target);
    }

    let method_cacheable = parts.method == Method::GET || parts.method == Method::HEAD;
    let cache = &state.config.cache;
    let allow_cache = cache.cache_all || patterns_match(cache.patterns.as_slice(), &path);
    let head_only = parts.method == Method::HEAD;

    if method_cacheable && allow_cache {
        if let Some(entry) = state.store.get(&target).filter(|e| e.status == 200) {
            debug!(target = %target, "cache_hit");
            let rewritten = if is_sitemap_path(&path) {
                proxy_base
                    .as_ref()
                    .and_then(|base| rewritten_hosts(&entry.body, base, &state.upstream))
            } else {
                None
            };
            return cached_response(&entry, rewritten, head_only);
        }

        // the cached copy always holds the full body, even for HEAD
        let req = upstream_request(Method::GET, &target, &parts.headers);
        let resp = match state.http.send(req).await {
            Ok(resp) => resp,
            Err(e) => return upstream_error(&target, &e),
        };
        let status = resp.status;
        let (header, body) = rewrite_for_bots(&state, &path, proxy_base.as_ref(), resp);

        if status == 200 {
            let ttl = ttl_for_path(cache, &path);
            let entry = CacheEntry::new(target.clone(), status, header.clone(), body.clone(), ttl);
            match state.store.put(&target, &entry) {
                Ok(_) => debug!(target = %target, ttl_seconds = ttl, "cache_store"),
                Err(e) => warn!(url = %target, error = %e, "cache_write_error"),
            }
        }
        let body = if head_only { Vec::new() } else { body };
        return build_response(status, "MISS", &header, body);
    }

    let forwarded = match to_bytes(body, MAX_FORWARD_BODY).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response(),
    };
    let mut req = upstream_request(parts.method.clone(), &target, &parts.headers);
    if !forwarded.is_empty() {
        req = req.body(forwarded);
    }
    let resp = match state.http.send(req).await {
        Ok(resp) => resp,
        Err(e) => return upstream_error(&target, &e),
    };
    let status = resp.status;
    let (header, body) = rewrite_for_bots(&state, &path, proxy_base.as_ref(), resp);
    let body = if parts.method == Method::GET { body } else { Vec::new() };
    build_response(status, "MISS", &header, body)
}

/// `robots.txt` is always rewritten, whatever its content type.
pub async fn robots(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let target = state.upstream_url("/robots.txt");
    let proxy_base = derive_proxy_base(state.config.a_base_url.as_deref(), req.headers(), req.uri());

    if let Some(entry) = state.store.get(&target).filter(|e| e.status == 200) {
        let rewritten = proxy_base
            .as_ref()
            .and_then(|base| rewritten_hosts(&entry.body, base, &state.upstream));
        return cached_response(&entry, rewritten, false);
    }

    let upstream = UpstreamRequest::get(&target).user_agent(header_str(req.headers(), header::USER_AGENT));
    let resp = match state.http.send(upstream).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(target = %target, error = %e, "robots_fetch_error");
            return (StatusCode::BAD_GATEWAY, "upstream fetch error").into_response();
        }
    };

    let mut header = cacheable_headers(&resp.headers);
    header
        .entry(HEADER_CONTENT_TYPE.to_string())
        .or_insert_with(|| ROBOTS_DEFAULT_CONTENT_TYPE.to_string());
    let mut body = resp.body;
    if let Some(rewritten) = proxy_base
        .as_ref()
        .and_then(|base| rewritten_hosts(&body, base, &state.upstream))
    {
        body = rewritten;
        strip_validators(&mut header);
    }

    if resp.status == 200 {
        let ttl = ttl_for_path(&state.config.cache, "/robots.txt");
        let entry = CacheEntry::new(target.clone(), resp.status, header.clone(), body.clone(), ttl);
        match state.store.put(&target, &entry) {
            Ok(_) => debug!(target = %target, ttl_seconds = ttl, "cache_store"),
            Err(e) => warn!(url = %target, error = %e, "cache_write_error"),
        }
    }
    build_response(resp.status, "MISS", &header, body)
}

fn rewritten_hosts(body: &[u8], proxy: &Url, upstream: &Url) -> Option<Vec<u8>> {
    match rewrite_hosts(body, proxy, upstream) {
        (out, true) => Some(out.into_owned()),
        _ => None,
    }
}

/// Rewrites an upstream response for a crawler. Sitemap paths are rewritten
/// regardless of content type; validators are dropped from rewritten bodies.
fn rewrite_for_bots(
    state: &AppState,
    path: &str,
    proxy_base: Option<&Url>,
    resp: UpstreamResponse,
) -> (BTreeMap<String, String>, Vec<u8>) {
    let mut header = cacheable_headers(&resp.headers);
    let Some(proxy) = proxy_base else {
        return (header, resp.body);
    };
    let rewritten = if is_sitemap_path(path) {
        rewritten_hosts(&resp.body, proxy, &state.upstream)
    } else {
        let content_type = header.get(HEADER_CONTENT_TYPE).map(String::as_str).unwrap_or_default();
        match rewrite_body(&resp.body, content_type, proxy, &state.upstream) {
            (out, true) => Some(out.into_owned()),
            _ => None,
        }
    };
    match rewritten {
        Some(body) => {
            strip_validators(&mut header);
            (header, body)
        }
        None => (header, resp.body),
    }
}

/// Serves a cache hit. A body rewritten on the fly carries only its content
/// type; otherwise every stored header is replayed.
fn cached_response(entry: &CacheEntry, rewritten: Option<Vec<u8>>, head_only: bool) -> Response {
    let (header, body) = match rewritten {
        Some(body) => {
            let mut header = BTreeMap::new();
            if let Some(ct) = entry.content_type().filter(|ct| !ct.is_empty()) {
                header.insert(HEADER_CONTENT_TYPE.to_string(), ct.to_string());
            }
            (header, body)
        }
        None => (entry.header.clone(), entry.body.clone()),
    };
    let body = if head_only { Vec::new() } else { body };
    let mut resp = build_response(entry.status, "HIT", &header, body);
    let headers = resp.headers_mut();
    for (name, at) in [
        (X_CACHE_GENERATED_AT, entry.created_at),
        (X_CACHE_EXPIRES_AT, entry.expires_at),
    ] {
        if let Some(v) = rfc3339(at).and_then(|s| HeaderValue::from_str(&s).ok()) {
            headers.insert(name, v);
        }
    }
    resp
}

pub fn rfc3339(unix: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(unix, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn build_response(status: u16, x_cache: &'static str, header: &BTreeMap<String, String>, body: Vec<u8>) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = resp.headers_mut();
    headers.insert(X_CACHE, HeaderValue::from_static(x_cache));
    for (k, v) in header {
        if ![HEADER_CONTENT_TYPE, HEADER_LAST_MODIFIED, HEADER_ETAG].contains(&k.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
            headers.insert(name, value);
        }
    }
    resp
}

fn redirect(status: u16, target: &str) -> Response {
    let status = StatusCode::from_u16(status)
        .ok()
        .filter(StatusCode::is_redirection)
        .unwrap_or(StatusCode::FOUND);
    match HeaderValue::from_str(target) {
        Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid request target").into_response(),
    }
}

fn upstream_error(target: &str, err: &rerouter_core::RerouterError) -> Response {
    error!(target = %target, error = %err, "fetch_error");
    (StatusCode::BAD_GATEWAY, "upstream fetch error").into_response()
}
