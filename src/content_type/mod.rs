//! Content-Type Arbiter.
//!
//! Combines the binary sniffer, URL-extension hints, and whatever upstream
//! declared, in a fixed precedence order.

use crate::mime::MimeClassifier;
use crate::sniff::is_mpeg_ts;

pub const MPEG_TS: &str = "video/mp2t";
pub const HLS_MANIFEST: &str = "application/vnd.apple.mpegurl";
pub const OCTET_STREAM: &str = "application/octet-stream";

pub struct ContentTypeArbiter;

impl ContentTypeArbiter {
    /// Decide the `Content-Type` to send the client for `body`, fetched from
    /// `url`, given the type (if any) upstream declared.
    pub fn classify(body: &[u8], url: &str, upstream_content_type: Option<&str>) -> String {
        if is_mpeg_ts(body) {
            return MPEG_TS.to_string();
        }

        if MimeClassifier::is_m3u8(url) && !upstream_content_type.is_some_and(|ct| ct.eq_ignore_ascii_case(HLS_MANIFEST)) {
            return HLS_MANIFEST.to_string();
        }

        if MimeClassifier::is_disguised_segment(url) {
            return MPEG_TS.to_string();
        }

        upstream_content_type.map(str::to_string).unwrap_or_else(|| OCTET_STREAM.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_sniff_wins_over_everything_else() {
        let mut body = vec![0u8; 400];
        body[0] = 0x47;
        body[188] = 0x47;
        assert_eq!(
            ContentTypeArbiter::classify(&body, "https://host/video.mp4", Some("video/mp4")),
            MPEG_TS
        );
    }

    #[test]
    fn m3u8_url_overrides_generic_upstream_type() {
        assert_eq!(
            ContentTypeArbiter::classify(b"#EXTM3U\n", "https://host/a.m3u8", Some("text/plain")),
            HLS_MANIFEST
        );
    }

    #[test]
    fn m3u8_url_defers_to_upstream_when_already_correct() {
        assert_eq!(
            ContentTypeArbiter::classify(b"#EXTM3U\n", "https://host/a.m3u8", Some(HLS_MANIFEST)),
            HLS_MANIFEST
        );
    }

    #[test]
    fn disguised_segment_classifies_as_mpeg_ts() {
        assert_eq!(
            ContentTypeArbiter::classify(b"not ts data", "https://host/seg-001.js", Some("application/javascript")),
            MPEG_TS
        );
    }

    #[test]
    fn falls_back_to_upstream_type_then_octet_stream() {
        assert_eq!(
            ContentTypeArbiter::classify(b"abc", "https://host/a.bin", Some("application/x-custom")),
            "application/x-custom"
        );
        assert_eq!(ContentTypeArbiter::classify(b"abc", "https://host/a.bin", None), OCTET_STREAM);
    }
}
