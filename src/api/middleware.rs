//! API Middleware
//!
//! Request logging with correlation IDs and request statistics, and security
//! headers on every response.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use super::stats::SharedRequestStats;
use crate::common::logging::{generate_correlation_id, log_api_request, log_api_response};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Log each request and its response, tagging both with one correlation ID,
/// and count the response in `stats`.
///
/// A caller-supplied `x-request-id` is reused; otherwise one is generated and
/// echoed back on the response.
pub async fn request_logging_middleware(
    State(stats): State<SharedRequestStats>,
    request: Request,
    next: Next,
) -> Response {
    let correlation_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_correlation_id);

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    log_api_request(&method, &path, &correlation_id);
    let mut response = next.run(request).await;

    let duration_ms = started.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    log_api_response(&method, &path, status, duration_ms, &correlation_id);
    stats.record(status, duration_ms).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );

    response
}
