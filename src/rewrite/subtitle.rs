//! WebVTT subtitle rewriting.
//!
//! Scans for bare image references (thumbnail cues embedded in VTT text),
//! resolves each one against the target URL, and replaces every textual
//! occurrence with the proxied equivalent. Unlike the playlist rewriter,
//! failures here are swallowed: an unparsable target URL returns the
//! original text unmodified.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use super::{proxied_url, resolve_reference};

fn image_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)[^\s"']+?\.(?:jpg|jpeg|png|gif|webp)"#).expect("VTT image reference regex must compile")
    })
}

pub struct RewriteParams<'a> {
    pub proxy_base_url: &'a str,
    pub target_url: &'a Url,
    pub url_param_name: &'a str,
    pub preserve_query_params: bool,
}

/// Rewrite every image reference in `input`. Dedupe before resolving so a
/// thumbnail sprite referenced on every cue is only resolved once.
pub fn rewrite(input: &str, params: &RewriteParams) -> String {
    let mut references: Vec<&str> = image_reference_regex().find_iter(input).map(|m| m.as_str()).collect();
    references.sort_unstable();
    references.dedup();

    let mut output = input.to_string();
    for reference in references {
        let Some(resolved) = resolve_reference(params.target_url, reference) else {
            continue;
        };
        let proxied = proxied_url(params.proxy_base_url, params.url_param_name, &resolved, params.preserve_query_params);
        output = output.replace(reference, &proxied);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params<'a>(target_url: &'a Url) -> RewriteParams<'a> {
        RewriteParams {
            proxy_base_url: "https://proxy.local/",
            target_url,
            url_param_name: "url",
            preserve_query_params: true,
        }
    }

    #[test]
    fn rewrites_jpg_image_references() {
        let input = "WEBVTT\n\n00:00:00.000 --> 00:00:05.000\n<c.thumbnail>thumb/001.jpg</c>\n";
        let target = Url::parse("https://cdn.example.com/subs/sub.vtt").unwrap();
        let output = rewrite(input, &params(&target));
        assert!(output.contains("proxy.local/?url="));
        assert!(!output.contains("thumb/001.jpg"));
    }

    #[test]
    fn dedupes_repeated_references() {
        let input = "WEBVTT\n\nthumb/a.png\nthumb/a.png\n";
        let target = Url::parse("https://cdn.example.com/subs/sub.vtt").unwrap();
        let output = rewrite(input, &params(&target));
        let occurrences = output.matches("proxy.local").count();
        assert_eq!(occurrences, 2);
    }

    #[test]
    fn non_image_text_is_untouched() {
        let input = "WEBVTT\n\nHello, this is a plain caption line.\n";
        let target = Url::parse("https://cdn.example.com/subs/sub.vtt").unwrap();
        assert_eq!(rewrite(input, &params(&target)), input);
    }
}
