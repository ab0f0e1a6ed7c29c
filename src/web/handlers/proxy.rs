//! Handlers for the three URL-admission surfaces names: `?url=`,
//! an inline path segment, and a base64-encoded path segment. All three
//! decode to a plain string and hand off to [`ProxyPipeline::handle`],
//! which re-validates it identically.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::web::AppState;

pub async fn root(State(state): State<AppState>, method: Method, Query(params): Query<HashMap<String, String>>, headers: HeaderMap, body: Bytes) -> Response {
    let raw_url = params.get("url").cloned().unwrap_or_default();
    let body = (!body.is_empty()).then_some(body);
    state.pipeline.handle(method, raw_url, headers, body).await
}

pub async fn inline(State(state): State<AppState>, method: Method, Path(raw_path): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let candidate = if raw_path.contains("://") { raw_path } else { format!("https://{raw_path}") };
    let body = (!body.is_empty()).then_some(body);
    state.pipeline.handle(method, candidate, headers, body).await
}

pub async fn base64(State(state): State<AppState>, method: Method, Path(encoded): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use base64::Engine;

    let decoded = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(&encoded))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());

    let Some(raw_url) = decoded else {
        return crate::errors::ProxyError::admission_for_url("base64 payload is not valid UTF-8 or not valid base64", encoded).into_response();
    };

    let body = (!body.is_empty()).then_some(body);
    state.pipeline.handle(method, raw_url, headers, body).await
}
