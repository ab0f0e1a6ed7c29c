//! Configuration loading.
//!
//! A `config.toml` on disk supplies defaults; a handful of environment
//! variables, named unprefixed for operator familiarity, override
//! individual fields via [`figment`]'s `Env` provider. CLI flags are
//! applied last, directly on the loaded struct, in `main.rs`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub web: WebConfig,
    pub proxy: ProxyConfig,
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Maximum accepted length (bytes) of a source URL
    pub max_url_length: usize,
    /// Non-empty allow-list of upstream hostnames; empty means "any host".
    pub allowed_hosts: Vec<String>,
    /// Upstream fetch timeout, in seconds.
    pub request_timeout_secs: u64,
    /// `Content-Length` above which the pipeline prefers the stream path.
    pub stream_size_threshold: u64,
    /// Master switch for the streaming fast-path.
    pub enable_streaming: bool,
    /// Adds `X-Accel-Buffering: no` / `CF-Cache-Status: DYNAMIC` on streamed
    /// responses for operators sitting behind Cloudflare.
    pub use_cloudflare: bool,
    /// Query parameter name carrying the upstream URL (`?url=`) and the one
    /// embedded in rewritten playlist/subtitle URIs.
    pub url_param_name: String,
    /// Public base URL the proxy is reachable at, used when rewriting nested
    /// playlist/subtitle references back through itself.
    pub public_base_url: String,
    /// Preserve the original query string when resolving/rewriting nested
    /// playlist URIs.
    pub preserve_query_params: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Soft aggregate size cap, in bytes, before least-recently-inserted
    /// eviction kicks in.
    pub max_total_bytes: u64,
    /// Absolute per-entry cap; larger bodies are never cached.
    pub max_entry_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of decompression workers; `0` means "use the CPU count".
    pub worker_count: usize,
    /// Bound on the task queue feeding the worker pool.
    pub queue_capacity: usize,
    /// Bodies smaller than this are decompressed inline.
    pub inline_threshold_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            proxy: ProxyConfig {
                max_url_length: 2048,
                allowed_hosts: Vec::new(),
                request_timeout_secs: 30,
                stream_size_threshold: 1_048_576,
                enable_streaming: true,
                use_cloudflare: false,
                url_param_name: "url".to_string(),
                public_base_url: "http://localhost:8080".to_string(),
                preserve_query_params: true,
            },
            cache: CacheConfig {
                max_total_bytes: 256 * 1024 * 1024,
                max_entry_bytes: 10 * 1024 * 1024,
            },
            worker: WorkerConfig {
                worker_count: 0,
                queue_capacity: 256,
                inline_threshold_bytes: 64 * 1024,
            },
        }
    }
}

impl Config {
    /// Load configuration from `config_path` (if it exists), overlaid with
    /// environment variables, falling back to [`Config::default`] for
    /// anything neither supplies.
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if std::path::Path::new(config_path).exists() {
            figment = figment.merge(Toml::file(config_path));
        } else {
            tracing::warn!(config_path, "config file not found, using default configuration values");
        }
        figment = figment.merge(Env::prefixed("PROXY_").split("__"));

        let mut config: Config = figment.extract()?;

        // Compatibility env vars kept unprefixed for operators migrating
        // config from the prior deployment.
        if let Ok(val) = std::env::var("USE_CLOUDFLARE") {
            config.proxy.use_cloudflare = parse_bool(&val, config.proxy.use_cloudflare);
        }
        if let Ok(val) = std::env::var("STREAM_SIZE_THRESHOLD") {
            if let Ok(parsed) = val.parse() {
                config.proxy.stream_size_threshold = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENABLE_STREAMING") {
            config.proxy.enable_streaming = parse_bool(&val, config.proxy.enable_streaming);
        }

        Ok(config)
    }
}

fn parse_bool(val: &str, default: bool) -> bool {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.proxy.max_url_length, 2048);
        assert_eq!(config.proxy.stream_size_threshold, 1_048_576);
        assert!(config.proxy.enable_streaming);
        assert_eq!(config.cache.max_entry_bytes, 10 * 1024 * 1024);
    }
}
