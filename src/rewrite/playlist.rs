//! HLS/M3U8 playlist rewriting.
//!
//! Walks the manifest line by line. Tag lines carrying a `URI="..."`
//! attribute (`EXT-X-KEY`, `EXT-X-MEDIA`, `EXT-X-MAP`,
//! `EXT-X-I-FRAME-STREAM-INF`) have just that attribute rewritten; bare,
//! non-tag lines (segment URIs following `EXTINF`, variant playlist URIs
//! following `EXT-X-STREAM-INF`) are rewritten wholesale. Everything else
//! passes through byte-for-byte, preserving line endings.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;
use url::Url;

use super::{proxied_url, resolve_reference};

const URI_ATTR_TAGS: &[&str] = &["EXT-X-KEY", "EXT-X-MEDIA", "EXT-X-MAP", "EXT-X-I-FRAME-STREAM-INF"];

pub struct RewriteParams<'a> {
    pub proxy_base_url: &'a str,
    pub target_url: &'a Url,
    pub url_param_name: &'a str,
    pub preserve_query_params: bool,
}

fn uri_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"URI="([^"]*)""#).expect("URI attribute regex must compile"))
}

/// Rewrite every nested reference in an M3U8 manifest so it routes back
/// through this proxy. Inputs that don't look like an M3U8 (no `#EXTM3U`,
/// case-insensitive) are returned unchanged.
pub fn rewrite(input: &str, params: &RewriteParams) -> String {
    if !input.to_ascii_uppercase().contains("#EXTM3U") {
        warn!("m3u8 rewriter received input without #EXTM3U tag, passing through unchanged");
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    for (content, ending) in lines_with_endings(input) {
        if content.is_empty() {
            out.push_str(ending);
            continue;
        }

        if let Some(rewritten) = content.strip_prefix('#').and_then(|rest| rewrite_tag_line(rest, params)) {
            out.push_str(&rewritten);
        } else if content.starts_with('#') {
            out.push_str(content);
        } else {
            out.push_str(&rewrite_bare_uri_line(content, params));
        }
        out.push_str(ending);
    }
    out
}

fn rewrite_tag_line(rest_after_hash: &str, params: &RewriteParams) -> Option<String> {
    let tag_name = rest_after_hash.split(':').next().unwrap_or(rest_after_hash);
    if !URI_ATTR_TAGS.contains(&tag_name) {
        return None;
    }

    let captures = uri_attr_regex().captures(rest_after_hash)?;
    let reference = captures.get(1)?.as_str();
    let resolved = resolve_reference(params.target_url, reference)?;
    let proxied = proxied_url(params.proxy_base_url, params.url_param_name, &resolved, params.preserve_query_params);
    let replacement = format!(r#"URI="{proxied}""#);
    Some(format!("#{}", uri_attr_regex().replace(rest_after_hash, replacement.as_str())))
}

fn rewrite_bare_uri_line(line: &str, params: &RewriteParams) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return line.to_string();
    }
    match resolve_reference(params.target_url, trimmed) {
        Some(resolved) => proxied_url(params.proxy_base_url, params.url_param_name, &resolved, params.preserve_query_params),
        None => line.to_string(),
    }
}

/// Split `text` into (content, line-ending) pairs, preserving `\r\n`, `\n`,
/// and a missing trailing newline on the final line.
fn lines_with_endings(text: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if let Some(idx) = rest.find('\n') {
            let (line, after) = rest.split_at(idx);
            let after = &after[1..];
            if let Some(stripped) = line.strip_suffix('\r') {
                out.push((stripped, "\r\n"));
            } else {
                out.push((line, "\n"));
            }
            rest = after;
        } else {
            out.push((rest, ""));
            rest = "";
        }
    }
    out
}
