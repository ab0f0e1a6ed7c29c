//! URL Admission.
//!
//! Three HTTP entry points funnel into the same validation: `?url=`, an
//! inline path segment, and a base64-encoded path segment. All three decode
//! to a plain string and are validated identically by [`admit`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use url::Url;

use crate::config::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionResult {
    Valid { url: String, hostname: Option<String> },
    Invalid { reason: String },
}

impl AdmissionResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, AdmissionResult::Valid { .. })
    }
}

/// Validate a raw, already-decoded URL string against length, shape, and
/// allow-list rules. Path-only or relative inputs are accepted (internal
/// routing) as long as they pass the length check — only strings that parse
/// as absolute URLs get scheme/host scrutiny.
pub fn admit(raw: &str, config: &ProxyConfig) -> AdmissionResult {
    if raw.is_empty() {
        return AdmissionResult::Invalid {
            reason: "URL must not be empty".to_string(),
        };
    }

    if raw.len() > config.max_url_length {
        return AdmissionResult::Invalid {
            reason: format!(
                "URL length {} exceeds maximum of {} bytes",
                raw.len(),
                config.max_url_length
            ),
        };
    }

    match Url::parse(raw) {
        Ok(parsed) => {
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return AdmissionResult::Invalid {
                    reason: format!("unsupported scheme '{}'; only http/https are allowed", parsed.scheme()),
                };
            }

            let hostname = match parsed.host_str() {
                Some(h) if !h.is_empty() => h.to_string(),
                _ => {
                    return AdmissionResult::Invalid {
                        reason: "URL must have a non-empty hostname".to_string(),
                    }
                }
            };

            if !config.allowed_hosts.is_empty() && !config.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(&hostname))
            {
                return AdmissionResult::Invalid {
                    reason: format!("host '{hostname}' is not in the allow-list"),
                };
            }

            AdmissionResult::Valid {
                url: raw.to_string(),
                hostname: Some(hostname),
            }
        }
        // Doesn't parse as an absolute URL: accept as a path-only / relative
        // input (internal routing), already within the length bound above.
        Err(_) => AdmissionResult::Valid {
            url: raw.to_string(),
            hostname: None,
        },
    }
}

/// Normalize an inline path-parameter URL by prefixing `https://` when no
/// scheme is present, then admit it.
pub fn admit_inline(raw_path: &str, config: &ProxyConfig) -> AdmissionResult {
    let candidate = if raw_path.contains("://") {
        raw_path.to_string()
    } else {
        format!("https://{raw_path}")
    };
    admit(&candidate, config)
}

/// Decode a base64 path parameter (URL-safe, unpadded or padded both
/// accepted) and admit the decoded string identically to the other two
/// entry points.
pub fn admit_base64(encoded: &str, config: &ProxyConfig) -> AdmissionResult {
    let decoded = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(encoded));

    match decoded {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(decoded_str) => admit(&decoded_str, config),
            Err(_) => AdmissionResult::Invalid {
                reason: "base64 payload is not valid UTF-8".to_string(),
            },
        },
        Err(_) => AdmissionResult::Invalid {
            reason: "invalid base64 encoding".to_string(),
        },
    }
}
