//! Error type definitions for the proxy.
//!
//! Only the error kinds that can legitimately escape the pipeline and reach
//! an HTTP client are represented here. Decompression, rewrite, and
//! cache failures are logged and handled inline by their own modules.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Top-level proxy error type.
///
/// Every variant carries enough detail to build the JSON error envelope:
/// `{error: {code, message, url?, usage?, details?}, success: false,
/// timestamp}`.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The requested URL failed admission (shape, length, or allow-list).
    #[error("invalid request URL: {reason}")]
    Admission { reason: String, url: Option<String> },

    /// The upstream fetch did not complete before the configured timeout.
    #[error("upstream request timed out after {timeout_secs}s")]
    UpstreamTimeout { timeout_secs: u64, url: String },

    /// The upstream connection failed outright (DNS, TLS, connection reset).
    #[error("upstream request failed: {message}")]
    UpstreamUnreachable { message: String, url: String },

    /// The upstream responded, but with a status the caller should see
    /// reflected back (propagated 4xx/5xx), and no body could be forwarded.
    #[error("upstream returned {status}")]
    UpstreamStatus {
        status: StatusCode,
        message: String,
        url: String,
        details: Option<serde_json::Value>,
    },

    /// Something failed in a way no component could recover from locally.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ProxyError {
    pub fn admission(reason: impl Into<String>) -> Self {
        Self::Admission {
            reason: reason.into(),
            url: None,
        }
    }

    pub fn admission_for_url(reason: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Admission {
            reason: reason.into(),
            url: Some(url.into()),
        }
    }

    fn code(&self) -> u16 {
        match self {
            ProxyError::Admission { .. } => 400,
            ProxyError::UpstreamTimeout { .. } => 504,
            ProxyError::UpstreamUnreachable { .. } => 502,
            ProxyError::UpstreamStatus { status, .. } => status.as_u16(),
            ProxyError::Internal { .. } => 500,
        }
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn url(&self) -> Option<&str> {
        match self {
            ProxyError::Admission { url, .. } => url.as_deref(),
            ProxyError::UpstreamTimeout { url, .. } => Some(url),
            ProxyError::UpstreamUnreachable { url, .. } => Some(url),
            ProxyError::UpstreamStatus { url, .. } => Some(url),
            ProxyError::Internal { .. } => None,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ProxyError::UpstreamStatus { details, .. } => details.clone(),
            _ => None,
        }
    }

    fn usage(&self) -> Option<&'static str> {
        match self {
            ProxyError::Admission { .. } => {
                Some("supply the upstream URL via ?url=, an inline path segment, or /base64/<encoded>")
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
    success: bool,
    timestamp: String,
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
                url: self.url().map(str::to_string),
                usage: self.usage().map(str::to_string),
                details: self.details(),
            },
            success: false,
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, axum::Json(json!(envelope))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_error_maps_to_400() {
        let err = ProxyError::admission("empty url");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn timeout_error_maps_to_504() {
        let err = ProxyError::UpstreamTimeout {
            timeout_secs: 10,
            url: "https://example.com/a.m3u8".to_string(),
        };
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.to_string().contains("10s"));
    }
}
