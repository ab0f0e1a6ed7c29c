//! Response Cache.
//!
//! A bounded in-memory store keyed by a fingerprint of (target URL, a stable
//! projection of representation-relevant request headers). Backed by the
//! `lru` crate the way the rest of this codebase prefers a small, focused
//! dependency over a hand-rolled structure — but reads use `peek` rather
//! than `get` so that cache hits don't reorder entries:
//! eviction policy is "least-recently-inserted", not least-recently-used.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use axum::http::HeaderMap;
use bytes::Bytes;
use lru::LruCache;
use url::Url;

/// Headers whose value affects the representation returned for a URL, and
/// so are folded into the cache fingerprint. `Range` is deliberately
/// excluded — a Range request slices an
/// already-cached full body rather than minting its own cache entry.
const FINGERPRINT_HEADERS: &[&str] = &["accept", "accept-encoding", "accept-language"];

/// Per-entry cap: bodies larger than this are never cached.
pub const MAX_ENTRY_BYTES: u64 = 10 * 1024 * 1024;

pub fn fingerprint(target_url: &Url, headers: &HeaderMap) -> String {
    let mut parts: Vec<String> = FINGERPRINT_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()).map(|v| format!("{name}={v}")))
        .collect();
    parts.sort();
    format!("{target_url}|{}", parts.join("&"))
}

#[derive(Clone)]
struct CacheEntry {
    bytes: Bytes,
    size: u64,
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    total_bytes: u64,
}

pub struct ResponseCache {
    inner: Mutex<Inner>,
    max_total_bytes: u64,
    max_entry_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// What a lookup against the cache yields: either the full body, or — when
/// the caller supplied a valid `Range` — just the requested slice plus the
/// total size needed to build `Content-Range`.
pub enum CacheLookup {
    Full(Bytes),
    Range { slice: Bytes, start: u64, end: u64, total: u64 },
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

impl ResponseCache {
    pub fn new(max_total_bytes: u64, max_entry_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            max_total_bytes,
            max_entry_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key`, slicing to `range` (start, end inclusive) if given and
    /// valid: `start <= end < size`. An invalid range falls back
    /// to returning the full body.
    pub fn get(&self, key: &str, range: Option<(u64, u64)>) -> Option<CacheLookup> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.entries.peek(key).cloned();

        match entry {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let size = entry.size;
                match range {
                    Some((start, end)) if start <= end && end < size => Some(CacheLookup::Range {
                        slice: entry.bytes.slice(start as usize..=end as usize),
                        start,
                        end,
                        total: size,
                    }),
                    _ => Some(CacheLookup::Full(entry.bytes)),
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert `bytes` under `key`. A no-op when the entry exceeds the
    /// per-entry cap; otherwise evicts
    /// least-recently-inserted entries until the aggregate size is back
    /// under the soft cap.
    pub fn put(&self, key: String, bytes: Bytes) {
        let size = bytes.len() as u64;
        if size > self.max_entry_bytes {
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.entries.peek(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.size);
        }

        inner.entries.put(key, CacheEntry { bytes, size });
        inner.total_bytes += size;

        while inner.total_bytes > self.max_total_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.total_bytes = inner.total_bytes.saturating_sub(evicted.size),
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            entries: inner.entries.len(),
            total_bytes: inner.total_bytes,
            max_total_bytes: self.max_total_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = ResponseCache::new(1024 * 1024, MAX_ENTRY_BYTES);
        cache.put("k".to_string(), Bytes::from_static(b"hello"));
        match cache.get("k", None) {
            Some(CacheLookup::Full(b)) => assert_eq!(&b[..], b"hello"),
            _ => panic!("expected a hit"),
        }
    }

    #[test]
    fn entries_over_max_entry_bytes_are_never_stored() {
        let cache = ResponseCache::new(1024 * 1024, 4);
        cache.put("k".to_string(), Bytes::from_static(b"too big"));
        assert!(cache.get("k", None).is_none());
    }

    #[test]
    fn valid_range_slices_the_cached_body() {
        let cache = ResponseCache::new(1024 * 1024, MAX_ENTRY_BYTES);
        cache.put("k".to_string(), Bytes::from_static(b"0123456789"));
        match cache.get("k", Some((2, 4))) {
            Some(CacheLookup::Range { slice, start, end, total }) => {
                assert_eq!(&slice[..], b"234");
                assert_eq!((start, end, total), (2, 4, 10));
            }
            _ => panic!("expected a range hit"),
        }
    }

    #[test]
    fn invalid_range_falls_back_to_full_body() {
        let cache = ResponseCache::new(1024 * 1024, MAX_ENTRY_BYTES);
        cache.put("k".to_string(), Bytes::from_static(b"0123456789"));
        match cache.get("k", Some((5, 2))) {
            Some(CacheLookup::Full(b)) => assert_eq!(b.len(), 10),
            _ => panic!("expected fallback to full body"),
        }
    }

    #[test]
    fn aggregate_cap_evicts_least_recently_inserted() {
        let cache = ResponseCache::new(10, MAX_ENTRY_BYTES);
        cache.put("a".to_string(), Bytes::from_static(b"12345"));
        cache.put("b".to_string(), Bytes::from_static(b"12345"));
        // Inserting a third 5-byte entry pushes aggregate size to 15,
        // over the 10-byte cap, evicting "a" (the oldest insertion).
        cache.put("c".to_string(), Bytes::from_static(b"12345"));
        assert!(cache.get("a", None).is_none());
        assert!(cache.get("b", None).is_some());
        assert!(cache.get("c", None).is_some());
    }

    #[test]
    fn fingerprint_ignores_range_header() {
        let url = Url::parse("https://host/a.ts").unwrap();
        let mut h1 = HeaderMap::new();
        h1.insert("range", "bytes=0-10".parse().unwrap());
        let mut h2 = HeaderMap::new();
        h2.insert("range", "bytes=20-30".parse().unwrap());
        assert_eq!(fingerprint(&url, &h1), fingerprint(&url, &h2));
    }
}
