//! `streamshift-proxy`: a streaming-aware HTTP reverse proxy for HLS and
//! DASH media delivery.

pub mod admission;
pub mod cache;
pub mod compression;
pub mod config;
pub mod content_type;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod mime;
pub mod proxy;
pub mod rewrite;
pub mod sniff;
pub mod web;
pub mod workers;
