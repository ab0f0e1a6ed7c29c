//! Playlist & Subtitle Rewriting.
//!
//! Both rewriters resolve a reference URI found inside streamed text against
//! the target URL the manifest/subtitle was fetched from, then replace it
//! with a URL that routes back through this proxy. [`resolve_reference`] is
//! the one piece of logic both share.

pub mod playlist;
pub mod subtitle;

use url::Url;

/// Resolve `reference` — absolute, protocol-relative (`//host/path`),
/// root-relative (`/path`), or path-relative — against `base` (the URL the
/// containing document was fetched from).
pub fn resolve_reference(base: &Url, reference: &str) -> Option<Url> {
    if reference.is_empty() {
        return None;
    }

    if let Ok(absolute) = Url::parse(reference) {
        return Some(absolute);
    }

    if let Some(rest) = reference.strip_prefix("//") {
        let candidate = format!("{}://{}", base.scheme(), rest);
        return Url::parse(&candidate).ok();
    }

    base.join(reference).ok()
}

/// Build the proxied URL a nested reference is rewritten to:
/// `<proxy_base>?<url_param>=<percent-encoded absolute URL>`.
pub fn proxied_url(proxy_base: &str, url_param_name: &str, resolved: &Url, preserve_query_params: bool) -> String {
    let mut target = resolved.clone();
    if !preserve_query_params {
        target.set_query(None);
    }
    let encoded = urlencoding::encode(target.as_str());
    let separator = if proxy_base.contains('?') { "&" } else { "?" };
    format!("{proxy_base}{separator}{url_param_name}={encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_absolute_protocol_relative_root_relative_and_path_relative() {
        let base = Url::parse("https://cdn.example.com/live/stream/playlist.m3u8").unwrap();

        assert_eq!(
            resolve_reference(&base, "https://other.example.com/a.ts").unwrap().as_str(),
            "https://other.example.com/a.ts"
        );
        assert_eq!(
            resolve_reference(&base, "//cdn.example.com/b.ts").unwrap().as_str(),
            "https://cdn.example.com/b.ts"
        );
        assert_eq!(
            resolve_reference(&base, "/absolute/c.ts").unwrap().as_str(),
            "https://cdn.example.com/absolute/c.ts"
        );
        assert_eq!(
            resolve_reference(&base, "seg-001.ts").unwrap().as_str(),
            "https://cdn.example.com/live/stream/seg-001.ts"
        );
    }

    #[test]
    fn proxied_url_strips_query_when_not_preserving() {
        let resolved = Url::parse("https://cdn.example.com/a.ts?token=abc").unwrap();
        let kept = proxied_url("https://proxy.local/", "url", &resolved, true);
        assert!(kept.contains("token%3Dabc") || kept.contains("token=abc"));

        let stripped = proxied_url("https://proxy.local/", "url", &resolved, false);
        assert!(!stripped.contains("token"));
    }
}
