use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::RngCore;
use std::time::Instant;
use tracing::info;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id attached to every request as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub fn new_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub async fn access_log(mut req: Request, next: Next) -> Response {
    let rid = new_request_id();
    req.extensions_mut().insert(RequestId(rid.clone()));

    let method = req.method().clone();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let ua = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;
    if let Ok(v) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, v);
    }

    info!(
        req_id = %rid,
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        ua = %ua,
        "access"
    );
    resp
}
