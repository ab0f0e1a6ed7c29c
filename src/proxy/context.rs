//! Request Context and the header/range plumbing shared by every
//! pipeline stage.

use axum::http::{HeaderMap, HeaderName};
use bytes::Bytes;
use std::time::Instant;
use url::Url;

/// Headers dropped from the client's request before synthesis:
/// hop-by-hop connection management and forwarding headers that must never
/// reach upstream (or would leak the proxy's own network topology).
const DROP_HEADERS: &[&str] = &["host", "connection", "content-length", "forwarded"];

fn is_forwarding_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("forwarded") || name.to_ascii_lowercase().starts_with("x-forwarded-")
}

/// Immutable per-request state threaded through the pipeline.
pub struct RequestContext {
    pub method: axum::http::Method,
    pub original_url: String,
    pub target_url: Url,
    pub client_headers: HeaderMap,
    pub range: Option<(u64, u64)>,
    pub body: Option<Bytes>,
    pub start: Instant,
}

impl RequestContext {
    pub fn new(method: axum::http::Method, original_url: String, target_url: Url, client_headers: HeaderMap, body: Option<Bytes>) -> Self {
        let range = client_headers.get(axum::http::header::RANGE).and_then(|v| v.to_str().ok()).and_then(parse_range);
        Self {
            method,
            original_url,
            target_url,
            client_headers,
            range,
            body,
            start: Instant::now(),
        }
    }

    /// Client headers with the drop-set removed — the remainder
    /// gets merged with a domain template in
    /// [`crate::domain::DomainTemplateRegistry::synthesize`].
    pub fn forwardable_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in self.client_headers.iter() {
            let lower = name.as_str();
            if DROP_HEADERS.contains(&lower) || is_forwarding_header(lower) {
                continue;
            }
            if let Ok(name) = HeaderName::from_bytes(lower.as_bytes()) {
                headers.append(name, value.clone());
            }
        }
        headers
    }
}

/// Parse a `Range: bytes=a-b` header into an inclusive `(start, end)` pair.
/// Only single-range, fully-bounded requests are understood; anything else
/// (open-ended, multi-range, malformed) yields `None`, which the pipeline
/// treats as "no range" (full body).
pub fn parse_range(value: &str) -> Option<(u64, u64)> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    if start > end {
        return None;
    }
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_range() {
        assert_eq!(parse_range("bytes=0-1023"), Some((0, 1023)));
    }

    #[test]
    fn rejects_open_ended_and_multi_range() {
        assert_eq!(parse_range("bytes=0-"), None);
        assert_eq!(parse_range("bytes=0-10,20-30"), None);
    }

    #[test]
    fn rejects_inverted_range() {
        assert_eq!(parse_range("bytes=10-5"), None);
    }

    #[test]
    fn forwardable_headers_drops_hop_by_hop_and_forwarding_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "client.example.com".parse().unwrap());
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        headers.insert("accept", "*/*".parse().unwrap());

        let ctx = RequestContext::new(
            axum::http::Method::GET,
            "https://host/a.ts".to_string(),
            Url::parse("https://host/a.ts").unwrap(),
            headers,
            None,
        );
        let forwarded = ctx.forwardable_headers();
        assert!(forwarded.get("host").is_none());
        assert!(forwarded.get("connection").is_none());
        assert!(forwarded.get("x-forwarded-for").is_none());
        assert!(forwarded.get("accept").is_some());
    }
}
