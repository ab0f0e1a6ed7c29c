//! Centralized error handling for the proxy.
//!
//! A single `thiserror`-derived enum that every fallible component converts
//! into, plus a convenience `ProxyResult` alias. This error type also
//! implements `IntoResponse` directly, since every error that escapes the
//! pipeline must become a JSON envelope on the wire.

pub mod types;

pub use types::ProxyError;

/// Convenience type alias for Results using [`ProxyError`].
pub type ProxyResult<T> = Result<T, ProxyError>;
