//! Domain templates: a hostname pattern plus the static headers it wants
//! forwarded to upstream, modelled after the per-source header overrides
//! operators configure for stream sources.

use std::collections::HashMap;

use regex::Regex;

/// A hostname matcher: either a simple glob (`*.example.com`) or a full
/// regex.
#[derive(Clone)]
pub enum HostPattern {
    Glob(String),
    Regex(Regex),
    /// Matches any hostname; only valid as the registry's final entry.
    Any,
}

impl HostPattern {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::Glob(pattern.into())
    }

    pub fn regex(pattern: &str) -> Self {
        Self::Regex(Regex::new(pattern).expect("built-in domain template regex must compile"))
    }

    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Any => true,
            HostPattern::Regex(re) => re.is_match(host),
            HostPattern::Glob(glob) => glob_matches(glob, host),
        }
    }
}

/// Minimal glob matcher supporting a single leading `*` wildcard, which
/// covers the `*.example.com` subdomain-matching shape domain templates
/// actually need.
fn glob_matches(glob: &str, host: &str) -> bool {
    match glob.strip_prefix('*') {
        Some(suffix) => host.ends_with(suffix),
        None => glob.eq_ignore_ascii_case(host),
    }
}

/// A named set of headers to synthesize for requests to a matching host.
#[derive(Clone)]
pub struct DomainTemplate {
    pub name: &'static str,
    pub pattern: HostPattern,
    /// Static headers applied verbatim (before UA substitution and
    /// Origin/Referer derivation).
    pub static_headers: HashMap<String, String>,
    /// Whether to derive `Origin`/`Referer` from the target URL. Almost
    /// always `true`; a template can opt out if its static headers already
    /// hardcode them.
    pub derive_origin_referer: bool,
}

impl DomainTemplate {
    fn new(name: &'static str, pattern: HostPattern, headers: &[(&str, &str)]) -> Self {
        Self {
            name,
            pattern,
            static_headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            derive_origin_referer: true,
        }
    }

    /// The built-in registry order used when no operator-supplied templates
    /// are configured. The last entry is the universal fallback.
    pub fn builtin() -> Vec<DomainTemplate> {
        vec![
            DomainTemplate::new(
                "akamai-hls",
                HostPattern::glob("*.akamaized.net"),
                &[("Accept", "*/*"), ("Accept-Encoding", "gzip, deflate, br, zstd")],
            ),
            DomainTemplate::new(
                "cloudfront-hls",
                HostPattern::glob("*.cloudfront.net"),
                &[("Accept", "*/*"), ("Accept-Encoding", "gzip, deflate, br, zstd")],
            ),
            DomainTemplate::new(
                "fastly-hls",
                HostPattern::glob("*.fastly.net"),
                &[("Accept", "*/*"), ("Accept-Encoding", "gzip, deflate, br, zstd")],
            ),
            DomainTemplate::new(
                "default",
                HostPattern::Any,
                &[("Accept", "*/*"), ("Accept-Encoding", "gzip, deflate, br, zstd")],
            ),
        ]
    }
}

/// User-Agent strings the registry rotates through, matching "The
/// User-Agent is drawn from a small fixed set per request."
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "AppleCoreMedia/1.0.0.21E236 (iPhone; U; CPU OS 17_4 like Mac OS X; en_us)",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_subdomain() {
        assert!(glob_matches("*.akamaized.net", "e1234.dscb.akamaized.net"));
        assert!(!glob_matches("*.akamaized.net", "akamaized.net.evil.com"));
    }

    #[test]
    fn builtin_last_entry_is_fallback() {
        let templates = DomainTemplate::builtin();
        assert!(matches!(templates.last().unwrap().pattern, HostPattern::Any));
    }
}
