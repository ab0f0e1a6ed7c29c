//! Linear-scan registry over [`DomainTemplate`]s with a per-hostname match
//! cache. Reads never block each other; only insertion into the cache
//! is serialized.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::templates::{DomainTemplate, USER_AGENTS};

/// Headers synthesized for a single outbound request to upstream.
pub type SynthesizedHeaders = HeaderMap;

pub struct DomainTemplateRegistry {
    templates: Vec<DomainTemplate>,
    /// hostname -> index into `templates` of the first match.
    match_cache: RwLock<HashMap<String, usize>>,
}

impl DomainTemplateRegistry {
    pub fn new(templates: Vec<DomainTemplate>) -> Self {
        Self {
            templates,
            match_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn builtin() -> Self {
        Self::new(DomainTemplate::builtin())
    }

    /// Find the template that applies to `host`, consulting (and populating)
    /// the per-hostname match cache.
    fn matched_template(&self, host: &str) -> &DomainTemplate {
        if let Some(&idx) = self.match_cache.read().unwrap().get(host) {
            return &self.templates[idx];
        }

        let idx = self
            .templates
            .iter()
            .position(|t| t.pattern.matches(host))
            .unwrap_or(self.templates.len() - 1);

        self.match_cache.write().unwrap().insert(host.to_string(), idx);
        &self.templates[idx]
    }

    /// Build the headers to send upstream for `target_url`, given the
    /// client's original headers (already filtered by the pipeline's
    /// drop-set before this is called).
    pub fn synthesize(&self, target_url: &Url, forwarded: &HeaderMap) -> SynthesizedHeaders {
        let host = target_url.host_str().unwrap_or_default();
        let template = self.matched_template(host);

        let mut headers = forwarded.clone();

        for (name, value) in &template.static_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        let user_agent = USER_AGENTS[fastrand::usize(..USER_AGENTS.len())];
        headers.insert(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_static(user_agent_static(user_agent)),
        );

        if template.derive_origin_referer {
            let origin = format!("{}://{}", target_url.scheme(), host);
            let referer = format!("{origin}/");
            if let Ok(v) = HeaderValue::from_str(&origin) {
                headers.insert(HeaderName::from_static("origin"), v);
            }
            if let Ok(v) = HeaderValue::from_str(&referer) {
                headers.insert(HeaderName::from_static("referer"), v);
            }
        }

        headers.insert(
            HeaderName::from_static("host"),
            HeaderValue::from_str(host).unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        // Never let a cached upstream response poison our own caching logic
        // or the client's.
        headers.remove("cache-control");
        headers.remove("pragma");

        headers
    }
}

/// `USER_AGENTS` entries are all `'static` already; this just satisfies the
/// borrow checker without cloning on every request.
fn user_agent_static(ua: &'static str) -> &'static str {
    ua
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins_and_fallback_always_matches() {
        let registry = DomainTemplateRegistry::builtin();
        let url = Url::parse("https://e1.dscb.akamaized.net/seg.ts").unwrap();
        let headers = registry.synthesize(&url, &HeaderMap::new());
        assert_eq!(headers.get("host").unwrap(), "e1.dscb.akamaized.net");

        let url = Url::parse("https://unknown-cdn.example.org/seg.ts").unwrap();
        let headers = registry.synthesize(&url, &HeaderMap::new());
        assert_eq!(headers.get("host").unwrap(), "unknown-cdn.example.org");
    }

    #[test]
    fn drops_cache_control_and_pragma() {
        let registry = DomainTemplateRegistry::builtin();
        let mut forwarded = HeaderMap::new();
        forwarded.insert("cache-control", HeaderValue::from_static("no-cache"));
        forwarded.insert("pragma", HeaderValue::from_static("no-cache"));
        let url = Url::parse("https://example.com/a.ts").unwrap();
        let headers = registry.synthesize(&url, &forwarded);
        assert!(headers.get("cache-control").is_none());
        assert!(headers.get("pragma").is_none());
    }

    #[test]
    fn derives_origin_and_referer() {
        let registry = DomainTemplateRegistry::builtin();
        let url = Url::parse("https://example.com/a.ts").unwrap();
        let headers = registry.synthesize(&url, &HeaderMap::new());
        assert_eq!(headers.get("origin").unwrap(), "https://example.com");
        assert_eq!(headers.get("referer").unwrap(), "https://example.com/");
    }
}
