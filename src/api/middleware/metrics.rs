//! Per-route HTTP request metrics

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::infrastructure::observability::record_http_request;

/// Probe routes, not recorded
const UNRECORDED_PATHS: [&str; 3] = ["/health", "/live", "/ready"];

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = route_label(&request);

    let response = next.run(request).await;

    if !UNRECORDED_PATHS.contains(&path.as_str()) {
        record_http_request(
            method.as_str(),
            &path,
            response.status().as_u16(),
            start.elapsed(),
        );
    }

    response
}

/// The matched route template, or the raw path when nothing matched
fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}
