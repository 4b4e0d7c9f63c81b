use crate::AppState;
use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rerouter_core::cache::purge as purge_cache;
use rerouter_core::RerouterError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
const STATUS_PATH: &str = "/admin/sitemap-cache/status";

/// Query string and urlencoded body values, body first.
#[derive(Debug, Default)]
struct Params(Vec<(String, String)>);

impl Params {
    fn parse(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> Self {
        let mut pairs = Vec::new();
        if content_type_contains(headers, "application/x-www-form-urlencoded") {
            pairs.extend(url::form_urlencoded::parse(body).into_owned());
        }
        if let Some(q) = query {
            pairs.extend(url::form_urlencoded::parse(q.as_bytes()).into_owned());
        }
        Self(pairs)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

fn content_type_contains(headers: &HeaderMap, needle: &str) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains(needle))
}

fn query_value(query: Option<&str>, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Token from the `X-Admin-Token` header, falling back to `?token=`.
fn presented_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| query_value(query, "token"))
}

fn authorize(state: &AppState, token: Option<&str>) -> Result<(), Response> {
    let Some(expected) = state.config.admin_token() else {
        return Err((StatusCode::FORBIDDEN, "admin disabled: set ADMIN_TOKEN").into_response());
    };
    if token != Some(expected) {
        return Err((StatusCode::FORBIDDEN, "forbidden").into_response());
    }
    Ok(())
}

fn is_truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

#[derive(Debug, Default, Deserialize)]
struct PurgeBody {
    #[serde(default)]
    url: String,
    #[serde(default)]
    partial: bool,
}

/// `POST|DELETE /admin/purge?url=...&partial=1`
pub async fn purge(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = authorize(&state, presented_token(&headers, query.as_deref()).as_deref()) {
        return resp;
    }

    let params = Params::parse(query.as_deref(), &headers, &body);
    let mut q = params
        .get("url")
        .or_else(|| params.get("q"))
        .unwrap_or_default()
        .to_string();
    let mut partial = params.get("partial").is_some_and(is_truthy);
    if q.is_empty() && content_type_contains(&headers, "application/json") {
        let parsed: PurgeBody = serde_json::from_slice(&body).unwrap_or_default();
        q = parsed.url;
        partial |= parsed.partial;
    }

    let result = match purge_cache(&state.store, &state.config.b_base_url, &q, partial) {
        Ok(result) => result,
        Err(RerouterError::MissingField(_)) => {
            return (StatusCode::BAD_REQUEST, "missing url").into_response();
        }
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid url").into_response(),
    };
    info!(partial, query = %q, deleted = result.deleted, "admin_purge");
    Json(result).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct WarmRequest {
    #[serde(default)]
    sitemap_url: String,
    #[serde(default)]
    max_urls: i64,
    #[serde(default)]
    a_base_url: String,
    #[serde(default)]
    token: String,
}

/// `POST /admin/sitemap-cache`
pub async fn start_warm_job(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut token = presented_token(&headers, query.as_deref());
    let request = if content_type_contains(&headers, "application/json") {
        match serde_json::from_slice::<WarmRequest>(&body) {
            Ok(req) => req,
            Err(_) => return (StatusCode::BAD_REQUEST, "invalid json").into_response(),
        }
    } else {
        let params = Params::parse(query.as_deref(), &headers, &body);
        if token.is_none() {
            token = params.get("token").map(str::to_string);
        }
        WarmRequest {
            sitemap_url: params.get("sitemap_url").unwrap_or_default().to_string(),
            max_urls: params
                .get("max_urls")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
            a_base_url: params.get("a_base_url").unwrap_or_default().to_string(),
            token: String::new(),
        }
    };
    if !request.token.is_empty() {
        token = Some(request.token.clone());
    }
    if let Err(resp) = authorize(&state, token.as_deref()) {
        return resp;
    }

    let override_base = Some(request.a_base_url.as_str()).filter(|b| !b.trim().is_empty());
    let job = match state
        .warm
        .start_job(&request.sitemap_url, request.max_urls, override_base)
    {
        Ok(job) => job,
        Err(RerouterError::MissingField(_)) => {
            return (StatusCode::BAD_REQUEST, "missing sitemap_url").into_response();
        }
        Err(e) => {
            error!(error = %e, sitemap = %request.sitemap_url, "admin_sitemap_cache_error");
            return (StatusCode::BAD_REQUEST, "failed to start job").into_response();
        }
    };
    info!(sitemap = %job.sitemap_url, job_id = %job.job_id, "admin_sitemap_cache_queued");

    let encoded: String = url::form_urlencoded::byte_serialize(job.job_id.as_bytes()).collect();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "job_id": job.job_id,
            "state": job.state.as_str(),
            "sitemap_url": job.sitemap_url,
            "status_url": format!("{STATUS_PATH}?job={encoded}"),
        })),
    )
        .into_response()
}

/// `GET /admin/sitemap-cache/status[?job=<id>]`
pub async fn warm_job_status(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, presented_token(&headers, query.as_deref()).as_deref()) {
        return resp;
    }

    let job_id = query_value(query.as_deref(), "job").or_else(|| query_value(query.as_deref(), "job_id"));
    match job_id {
        Some(id) => match state.warm.snapshot(&id) {
            Some(snapshot) => Json(snapshot).into_response(),
            None => (StatusCode::NOT_FOUND, "job not found").into_response(),
        },
        None => Json(serde_json::json!({ "jobs": state.warm.list_jobs() })).into_response(),
    }
}
