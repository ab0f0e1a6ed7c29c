//! MIME & Segment Classifier.
//!
//! Pure functions over a URL path/extension — no network or filesystem
//! access — so the rest of the pipeline can call these cheaply and
//! repeatedly without synchronization concerns.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Extension -> MIME type table for the formats this proxy cares about.
/// Unknown extensions fall back to `application/octet-stream` at the call
/// site, not here.
fn extension_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("m3u8", "application/vnd.apple.mpegurl"),
            ("m3u", "application/vnd.apple.mpegurl"),
            ("ts", "video/mp2t"),
            ("m4s", "video/iso.segment"),
            ("mp4", "video/mp4"),
            ("m4a", "audio/mp4"),
            ("aac", "audio/aac"),
            ("mp3", "audio/mpeg"),
            ("vtt", "text/vtt"),
            ("srt", "application/x-subrip"),
            ("mpd", "application/dash+xml"),
            ("key", "application/octet-stream"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("png", "image/png"),
            ("gif", "image/gif"),
            ("webp", "image/webp"),
            ("js", "application/javascript"),
            ("css", "text/css"),
            ("html", "text/html"),
            ("json", "application/json"),
        ])
    })
}

/// Extensions that are never media, used by the disguised-segment rule: a
/// segment hidden under one of these is still `video/mp2t`.
const NON_MEDIA_EXTENSIONS: &[&str] = &["js", "jpg", "png", "gif", "css", "html"];

fn segment_name_regexes() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)seg-\d+",
            r"(?i)segment-\d+",
            r"(?i)chunk-\d+",
            r"(?i)-v\d+-a\d+",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("built-in segment-naming regex must compile"))
        .collect()
    })
}

pub struct MimeClassifier;

impl MimeClassifier {
    /// Look up the MIME type for a URL's file extension, ignoring query
    /// strings and fragments.
    pub fn mime_for_extension(url: &str) -> Option<&'static str> {
        let ext = extension_of(url)?;
        extension_table().get(ext.as_str()).copied()
    }

    pub fn is_m3u8(url: &str) -> bool {
        path_of(url).to_ascii_lowercase().ends_with(".m3u8")
    }

    pub fn is_vtt(url: &str) -> bool {
        path_of(url).to_ascii_lowercase().ends_with(".vtt")
    }

    pub fn is_ts_segment(url: &str) -> bool {
        path_of(url).to_ascii_lowercase().ends_with(".ts")
    }

    /// A *disguised segment*: a URL whose basename matches one of the
    /// segment-naming patterns AND ends in a non-media extension.
    /// Includes the preserved legacy rule: any `.jpg` URL containing
    /// both `segment-` and `-v1-a1` classifies as a disguised segment even
    /// if the generic naming patterns wouldn't otherwise flag it.
    pub fn is_disguised_segment(url: &str) -> bool {
        let path = path_of(url);
        let basename = path.rsplit('/').next().unwrap_or(&path);
        let lower = basename.to_ascii_lowercase();

        let ext = extension_of(url);
        let is_non_media_ext = ext
            .as_deref()
            .map(|e| NON_MEDIA_EXTENSIONS.contains(&e))
            .unwrap_or(false);

        if !is_non_media_ext {
            return false;
        }

        if segment_name_regexes().iter().any(|re| re.is_match(&lower)) {
            return true;
        }

        // Legacy rule preserved verbatim.
        lower.ends_with(".jpg") && lower.contains("segment-") && lower.contains("-v1-a1")
    }

    pub fn is_streaming_format(url: &str) -> bool {
        Self::is_m3u8(url)
            || Self::is_ts_segment(url)
            || matches!(extension_of(url).as_deref(), Some("mp4") | Some("mp3") | Some("m4s"))
            || Self::is_disguised_segment(url)
    }

    pub fn needs_m3u8_rewriting(url: &str, upstream_content_type: Option<&str>) -> bool {
        Self::is_m3u8(url)
            || upstream_content_type
                .map(|ct| ct.eq_ignore_ascii_case("application/vnd.apple.mpegurl") || ct.eq_ignore_ascii_case("application/x-mpegurl"))
                .unwrap_or(false)
    }
}

fn path_of(url: &str) -> String {
    url.split(['?', '#']).next().unwrap_or(url).to_string()
}

fn extension_of(url: &str) -> Option<String> {
    let path = path_of(url);
    let basename = path.rsplit('/').next()?;
    let ext = basename.rsplit('.').next()?;
    if ext == basename {
        // no '.' in basename
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disguised_segment_requires_naming_pattern_and_non_media_extension() {
        assert!(MimeClassifier::is_disguised_segment("https://host/seg-00012.js"));
        assert!(MimeClassifier::is_disguised_segment("https://host/segment-5.jpg"));
        assert!(MimeClassifier::is_disguised_segment("https://host/chunk-3.png"));
        assert!(!MimeClassifier::is_disguised_segment("https://host/seg-00012.ts"));
        assert!(!MimeClassifier::is_disguised_segment("https://host/index.js"));
    }

    #[test]
    fn legacy_segment_v1_a1_rule_preserved() {
        assert!(MimeClassifier::is_disguised_segment(
            "https://host/segment-stream-v1-a1.jpg"
        ));
    }

    #[test]
    fn mime_lookup_ignores_query_string() {
        assert_eq!(
            MimeClassifier::mime_for_extension("https://host/a.m3u8?token=abc"),
            Some("application/vnd.apple.mpegurl")
        );
    }

    #[test]
    fn needs_m3u8_rewriting_checks_url_and_content_type() {
        assert!(MimeClassifier::needs_m3u8_rewriting("https://host/a.m3u8", None));
        assert!(MimeClassifier::needs_m3u8_rewriting(
            "https://host/a",
            Some("application/vnd.apple.mpegurl")
        ));
        assert!(!MimeClassifier::needs_m3u8_rewriting("https://host/a.ts", Some("video/mp2t")));
    }
}
