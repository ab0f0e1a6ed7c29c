//! Logging helpers.
//!
//! Upstream URLs often carry short-lived auth tokens or signed-URL
//! parameters in their query string. [`obfuscate_credentials`] masks every
//! query parameter's value before a URL is written to a log line, mirroring
//! the credential-scrubbing a CDN-facing proxy needs regardless of which
//! language it's written in — the value is still useful for correlating log
//! lines to a request, the secret itself is not.

use url::Url;

/// Replace every query parameter's value with `***`, leaving parameter
/// names, the scheme/host/path, and the fragment untouched. Falls back to
/// returning the input unchanged if it doesn't parse as a URL at all.
pub fn obfuscate_credentials(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    if parsed.query().is_none() {
        return parsed.to_string();
    }

    let masked_pairs: Vec<(String, &'static str)> = parsed.query_pairs().map(|(k, _)| (k.into_owned(), "***")).collect();

    parsed.query_pairs_mut().clear().extend_pairs(masked_pairs);
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_every_query_value_but_keeps_param_names() {
        let masked = obfuscate_credentials("https://cdn.example.com/seg.ts?token=abc123&user=alice");
        assert!(masked.contains("token=***"));
        assert!(masked.contains("user=***"));
        assert!(!masked.contains("abc123"));
        assert!(!masked.contains("alice"));
    }

    #[test]
    fn leaves_url_without_query_untouched() {
        assert_eq!(obfuscate_credentials("https://cdn.example.com/seg.ts"), "https://cdn.example.com/seg.ts");
    }

    #[test]
    fn passes_through_unparsable_input() {
        assert_eq!(obfuscate_credentials("not a url"), "not a url");
    }
}
