//! The Proxy Pipeline itself: admission → cache lookup →
//! header synthesis → upstream fetch → branch on response shape →
//! decompress/rewrite → classify → cache store → emit.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::admission::{self, AdmissionResult};
use crate::cache::{CacheLookup, ResponseCache};
use crate::compression::Encoding;
use crate::config::Config;
use crate::content_type::ContentTypeArbiter;
use crate::domain::DomainTemplateRegistry;
use crate::errors::ProxyError;
use crate::mime::MimeClassifier;
use crate::metrics::MetricsRegistry;
use crate::rewrite::{playlist, subtitle};
use crate::workers::WorkerPool;

use super::context::RequestContext;

/// Headers stripped from the upstream response before it's copied onto the
/// outgoing one.
const RESPONSE_DROP_HEADERS: &[&str] = &["connection", "transfer-encoding"];

pub struct ProxyPipeline {
    config: Arc<Config>,
    http_client: Client,
    domain_registry: DomainTemplateRegistry,
    cache: ResponseCache,
    workers: WorkerPool,
    pub metrics: Arc<MetricsRegistry>,
}

impl ProxyPipeline {
    pub fn new(config: Arc<Config>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.proxy.request_timeout_secs))
            .build()
            .expect("reqwest client with sane defaults must build");

        Self {
            cache: ResponseCache::new(config.cache.max_total_bytes, config.cache.max_entry_bytes),
            workers: WorkerPool::new(&config.worker),
            domain_registry: DomainTemplateRegistry::builtin(),
            metrics: Arc::new(MetricsRegistry::new()),
            http_client,
            config,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// `GET /debug`: admit the URL, resolve the domain template and
    /// synthesized headers that would be sent, and HEAD-probe upstream —
    /// without ever fetching/decoding/rewriting the actual body. Lets an
    /// operator diagnose a failing upstream without a full proxied fetch.
    pub async fn debug_probe(&self, raw_url: &str) -> serde_json::Value {
        use serde_json::json;

        let admission = admission::admit(raw_url, &self.config.proxy);
        let (url, hostname) = match &admission {
            AdmissionResult::Valid { url, hostname } => (url.clone(), hostname.clone()),
            AdmissionResult::Invalid { reason } => {
                return json!({
                    "admission": { "valid": false, "reason": reason },
                    "url": raw_url,
                });
            }
        };

        let Ok(target_url) = Url::parse(&url) else {
            return json!({ "admission": { "valid": false, "reason": "not an absolute URL" }, "url": url });
        };

        let synthesized = self.domain_registry.synthesize(&target_url, &HeaderMap::new());
        let synthesized_json: serde_json::Map<String, serde_json::Value> = synthesized
            .iter()
            .map(|(name, value)| (name.to_string(), json!(value.to_str().unwrap_or_default())))
            .collect();

        let probe = self.http_client.head(target_url.clone()).headers(synthesized.clone()).send().await;
        let upstream = match probe {
            Ok(response) => {
                let headers: serde_json::Map<String, serde_json::Value> = response
                    .headers()
                    .iter()
                    .map(|(name, value)| (name.to_string(), json!(value.to_str().unwrap_or_default())))
                    .collect();
                json!({ "status": response.status().as_u16(), "headers": headers })
            }
            Err(e) => json!({ "error": e.to_string() }),
        };

        json!({
            "admission": { "valid": true, "hostname": hostname },
            "url": url,
            "synthesized_headers": synthesized_json,
            "is_m3u8": MimeClassifier::is_m3u8(&url),
            "is_disguised_segment": MimeClassifier::is_disguised_segment(&url),
            "upstream": upstream,
        })
    }

    /// Entry point for every proxied exchange, regardless of which of the
    /// three URL-admission surfaces it arrived through.
    pub async fn handle(&self, method: Method, raw_url: String, client_headers: HeaderMap, body: Option<Bytes>) -> Response {
        self.metrics.record_request_start();
        let start = std::time::Instant::now();

        let result = self.handle_inner(method, raw_url, client_headers, body).await;

        let (response, body_len) = match result {
            Ok((response, len)) => (response, len),
            Err(err) => {
                let response = err.into_response();
                (response, 0)
            }
        };

        self.metrics.record_request_end(start.elapsed().as_millis() as u64, body_len as u64);
        response
    }

    async fn handle_inner(&self, method: Method, raw_url: String, client_headers: HeaderMap, body: Option<Bytes>) -> Result<(Response, usize), ProxyError> {
        // 1. Admit.
        let (url, hostname) = match admission::admit(&raw_url, &self.config.proxy) {
            AdmissionResult::Valid { url, hostname } => (url, hostname),
            AdmissionResult::Invalid { reason } => return Err(ProxyError::admission_for_url(reason, raw_url)),
        };
        if hostname.is_none() {
            return Err(ProxyError::admission_for_url("URL must be absolute http/https to proxy", url));
        }
        let target_url = Url::parse(&url).map_err(|e| ProxyError::admission_for_url(e.to_string(), url.clone()))?;

        let ctx = RequestContext::new(method, url.clone(), target_url.clone(), client_headers, body);

        // 2. Cache lookup (GET only).
        if ctx.method == Method::GET {
            let key = crate::cache::fingerprint(&ctx.target_url, &ctx.client_headers);
            if let Some(lookup) = self.cache.get(&key, ctx.range) {
                self.metrics.record_cache_hit();
                return Ok(self.respond_from_cache(&ctx, lookup));
            }
            self.metrics.record_cache_miss();
        }

        // 3. Synthesize headers.
        let forwarded = ctx.forwardable_headers();
        let upstream_headers = self.domain_registry.synthesize(&ctx.target_url, &forwarded);

        // 4/5. Fetch upstream, honoring the cancellation-by-timeout contract.
        let response = self.fetch_upstream(&ctx, upstream_headers).await?;

        // 6/7/8. Branch on response shape, decompress/rewrite, classify, cache, emit.
        self.handle_upstream_response(&ctx, response).await
    }

    async fn fetch_upstream(&self, ctx: &RequestContext, headers: HeaderMap) -> Result<reqwest::Response, ProxyError> {
        let mut request = self.http_client.request(ctx.method.clone(), ctx.target_url.clone()).headers(headers);
        if let Some(body) = ctx.body.clone() {
            request = request.body(body);
        }

        let timeout = Duration::from_secs(self.config.proxy.request_timeout_secs);
        match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ProxyError::UpstreamUnreachable {
                message: e.to_string(),
                url: ctx.target_url.to_string(),
            }),
            Err(_) => Err(ProxyError::UpstreamTimeout {
                timeout_secs: self.config.proxy.request_timeout_secs,
                url: ctx.target_url.to_string(),
            }),
        }
    }

    fn respond_from_cache(&self, ctx: &RequestContext, lookup: CacheLookup) -> (Response, usize) {
        let url = ctx.target_url.as_str();
        match lookup {
            CacheLookup::Full(bytes) => {
                let content_type = ContentTypeArbiter::classify(&bytes, url, None);
                let len = bytes.len();
                let mut response = (StatusCode::OK, bytes).into_response();
                self.finish_headers(&mut response, &content_type, false, true);
                (response, len)
            }
            CacheLookup::Range { slice, start, end, total } => {
                let content_type = ContentTypeArbiter::classify(&slice, url, None);
                let len = slice.len();
                let mut response = (StatusCode::PARTIAL_CONTENT, slice).into_response();
                response.headers_mut().insert(
                    header::CONTENT_RANGE,
                    HeaderValue::from_str(&format!("bytes {start}-{end}/{total}")).unwrap(),
                );
                self.finish_headers(&mut response, &content_type, false, true);
                (response, len)
            }
        }
    }

    async fn handle_upstream_response(&self, ctx: &RequestContext, response: reqwest::Response) -> Result<(Response, usize), ProxyError> {
        let status = response.status();
        let url = ctx.target_url.as_str();

        if !status.is_success() && status != StatusCode::PARTIAL_CONTENT {
            return self.passthrough_error_status(ctx, response).await;
        }

        let upstream_content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let declared_encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .and_then(Encoding::from_header_value);
        let upstream_headers = response.headers().clone();

        if status == StatusCode::PARTIAL_CONTENT {
            return self.passthrough_raw(ctx, response, upstream_headers, false).await;
        }

        let is_audio = is_audio_segment(url, upstream_content_type.as_deref());
        if is_audio {
            return self.passthrough_raw(ctx, response, upstream_headers, true).await;
        }

        let needs_playlist_rewrite = MimeClassifier::needs_m3u8_rewriting(url, upstream_content_type.as_deref());
        let needs_subtitle_rewrite = !needs_playlist_rewrite && MimeClassifier::is_vtt(url);

        // Large bodies prefer the stream path over buffering: a playlist or
        // subtitle still needs the whole body in memory to be rewritten, but
        // anything else above the configured threshold is piped straight
        // through when it isn't encoded — decompression forces a buffered
        // read regardless of size, since there's no streaming decoder here.
        let is_large = response.content_length().is_some_and(|len| len > self.config.proxy.stream_size_threshold);
        let prefer_stream_path = self.config.proxy.enable_streaming && is_large && !needs_playlist_rewrite && !needs_subtitle_rewrite;

        if prefer_stream_path && declared_encoding.is_none() {
            debug!(url = %crate::logging::obfuscate_credentials(url), "large response routed to the stream path");
            return self.passthrough_raw(ctx, response, upstream_headers, true).await;
        }

        self.materialize_and_process(ctx, response, declared_encoding, upstream_headers, needs_playlist_rewrite, needs_subtitle_rewrite, prefer_stream_path)
            .await
    }

    async fn passthrough_error_status(&self, ctx: &RequestContext, response: reqwest::Response) -> Result<(Response, usize), ProxyError> {
        let status = response.status();
        let bytes = response.bytes().await.unwrap_or_default();
        warn!(url = %crate::logging::obfuscate_credentials(ctx.target_url.as_str()), %status, "upstream returned a non-success status");

        let details: Option<serde_json::Value> = serde_json::from_slice(&bytes)
            .ok()
            .or_else(|| (!bytes.is_empty()).then(|| serde_json::Value::String(String::from_utf8_lossy(&bytes).to_string())));

        Err(ProxyError::UpstreamStatus {
            status,
            message: format!("upstream returned {status}"),
            url: ctx.target_url.to_string(),
            details,
        })
    }

    /// Pipe the upstream body straight through without decompressing or
    /// rewriting it: used for 206 passthrough, and for audio segments which
    /// must arrive byte-for-byte with their original `Content-Encoding`
    /// intact.
    async fn passthrough_raw(&self, ctx: &RequestContext, response: reqwest::Response, upstream_headers: HeaderMap, preserve_encoding: bool) -> Result<(Response, usize), ProxyError> {
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::OK);
        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let body = Body::from_stream(stream);

        let mut builder = Response::builder().status(status);
        for (name, value) in upstream_headers.iter() {
            if RESPONSE_DROP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if !preserve_encoding && name == header::CONTENT_ENCODING {
                continue;
            }
            builder = builder.header(name, value);
        }
        let mut response = builder.body(body).map_err(|e| ProxyError::Internal { message: e.to_string() })?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(crate::content_type::OCTET_STREAM)
            .to_string();
        self.finish_headers(&mut response, &content_type, true, false);

        debug!(url = %crate::logging::obfuscate_credentials(ctx.target_url.as_str()), "streamed upstream body through without materializing");
        Ok((response, content_length.unwrap_or(0) as usize))
    }

    /// The buffered path: read the whole body, decompress it (possibly via
    /// the worker pool), rewrite if it's a playlist/subtitle, classify, and
    /// store in cache if eligible. `bypass_cache` is set when this response
    /// was routed here only because decompression forced a buffered read
    /// despite being large enough to otherwise prefer the stream path — it
    /// must not be written to cache even though every other eligibility
    /// check would otherwise pass.
    #[allow(clippy::too_many_arguments)]
    async fn materialize_and_process(
        &self,
        ctx: &RequestContext,
        response: reqwest::Response,
        declared_encoding: Option<Encoding>,
        upstream_headers: HeaderMap,
        needs_playlist_rewrite: bool,
        needs_subtitle_rewrite: bool,
        bypass_cache: bool,
    ) -> Result<(Response, usize), ProxyError> {
        let status = response.status();
        let raw = response.bytes().await.map_err(|e| ProxyError::UpstreamUnreachable {
            message: e.to_string(),
            url: ctx.target_url.to_string(),
        })?;

        let was_encoded = declared_encoding.is_some() || crate::compression::detect_by_magic(&raw).is_some();
        let outcome = self.workers.decompress(raw.to_vec(), declared_encoding).await;
        let decompression_failed = was_encoded && outcome.encoding_used.is_none();

        let mut body = outcome.bytes;
        if needs_playlist_rewrite {
            let text = String::from_utf8_lossy(&body).into_owned();
            let params = playlist::RewriteParams {
                proxy_base_url: &self.config.proxy.public_base_url,
                target_url: &ctx.target_url,
                url_param_name: &self.config.proxy.url_param_name,
                preserve_query_params: self.config.proxy.preserve_query_params,
            };
            body = playlist::rewrite(&text, &params).into_bytes();
        } else if needs_subtitle_rewrite {
            let text = String::from_utf8_lossy(&body).into_owned();
            let params = subtitle::RewriteParams {
                proxy_base_url: &self.config.proxy.public_base_url,
                target_url: &ctx.target_url,
                url_param_name: &self.config.proxy.url_param_name,
                preserve_query_params: self.config.proxy.preserve_query_params,
            };
            body = subtitle::rewrite(&text, &params).into_bytes();
        }

        let upstream_content_type = upstream_headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let content_type = if needs_playlist_rewrite {
            crate::content_type::HLS_MANIFEST.to_string()
        } else if needs_subtitle_rewrite {
            "text/vtt".to_string()
        } else {
            ContentTypeArbiter::classify(&body, ctx.target_url.as_str(), upstream_content_type)
        };

        let eligible_for_cache =
            !bypass_cache && ctx.method == Method::GET && status == StatusCode::OK && ctx.range.is_none() && !decompression_failed;
        if eligible_for_cache {
            let key = crate::cache::fingerprint(&ctx.target_url, &ctx.client_headers);
            self.cache.put(key, Bytes::from(body.clone()));
        }

        let body_len = body.len();
        let mut builder = Response::builder().status(status);
        for (name, value) in upstream_headers.iter() {
            if RESPONSE_DROP_HEADERS.contains(&name.as_str()) || name == header::CONTENT_LENGTH {
                continue;
            }
            // A successful decompression is re-encoded as plain bytes, so
            // `Content-Encoding` must go with it. But when decompression
            // failed, `body` is still the original encoded bytes passed
            // through untouched (per §7, never fatal) — the header has to
            // stay so the client knows it still needs to decode them.
            if name == header::CONTENT_ENCODING && !decompression_failed {
                continue;
            }
            builder = builder.header(name, value);
        }
        let mut response = builder.body(Body::from(body)).map_err(|e| ProxyError::Internal { message: e.to_string() })?;

        let streaming = self.config.proxy.enable_streaming && MimeClassifier::is_streaming_format(ctx.target_url.as_str());
        self.finish_headers(&mut response, &content_type, streaming, false);

        Ok((response, body_len))
    }

    /// Apply CORS, `Accept-Ranges`, `X-Cache`, and streaming-specific
    /// headers common to every response shape.
    fn finish_headers(&self, response: &mut Response, content_type: &str, streaming: bool, cache_hit: bool) {
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap_or_else(|_| HeaderValue::from_static(crate::content_type::OCTET_STREAM)));
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            HeaderName::from_static("access-control-allow-methods"),
            HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS, PATCH"),
        );
        headers.insert(
            HeaderName::from_static("access-control-allow-headers"),
            HeaderValue::from_static("Range, Content-Type"),
        );
        headers.insert(
            HeaderName::from_static("access-control-expose-headers"),
            HeaderValue::from_static("Content-Length, Content-Range, Content-Type, Accept-Ranges"),
        );
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(
            HeaderName::from_static("x-cache"),
            HeaderValue::from_static(if cache_hit { "HIT" } else { "MISS" }),
        );

        if streaming {
            headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
            if self.config.proxy.use_cloudflare {
                headers.insert(HeaderName::from_static("cf-cache-status"), HeaderValue::from_static("DYNAMIC"));
            }
        }
    }
}

/// Audio segments pass through byte-for-byte with their original
/// `Content-Encoding` intact.
fn is_audio_segment(url: &str, upstream_content_type: Option<&str>) -> bool {
    let lower_url = url.to_ascii_lowercase();
    upstream_content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("audio/mp4") || ct.eq_ignore_ascii_case("audio/aac"))
        || lower_url.contains(".aac")
        || lower_url.contains("mp4a.40")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_segment_detection_checks_type_and_url_hints() {
        assert!(is_audio_segment("https://host/a.aac", None));
        assert!(is_audio_segment("https://host/seg.mp4", Some("audio/mp4")));
        assert!(is_audio_segment("https://host/audio-mp4a.40.2-seg.mp4", None));
        assert!(!is_audio_segment("https://host/video.mp4", Some("video/mp4")));
    }
}
