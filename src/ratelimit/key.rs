//! Bucket key derivation from inbound request context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Forwarded-address header set by proxies, a comma-separated client list.
const FORWARDED_FOR: &str = "x-forwarded-for";
/// Direct client address header set by reverse proxies.
const REAL_ADDR: &str = "x-real-ip";
/// Fallback key when no address header is present.
const UNKNOWN_KEY: &str = "unknown";

/// Case-insensitive header lookup over an inbound request.
///
/// The limiter never sees a concrete request type; middlewares implement
/// this over their framework's header map and hand the request straight to
/// [`RateLimiter::check`](super::RateLimiter::check).
pub trait HeaderSource {
    /// Look up a header value by name, case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Strategy for deriving the quota bucket key from a request.
#[derive(Clone, Default)]
pub enum KeyExtractor {
    /// First entry of the forwarded-address list, else the real-address
    /// header, else `"unknown"`.
    #[default]
    ClientAddr,
    /// Caller-supplied derivation, e.g. keying by an API token header.
    Custom(Arc<dyn Fn(&dyn HeaderSource) -> String + Send + Sync>),
}

impl KeyExtractor {
    /// Build a custom extractor from a closure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&dyn HeaderSource) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Derive the bucket key for a request.
    pub fn extract(&self, source: &dyn HeaderSource) -> String {
        match self {
            Self::ClientAddr => client_addr(source),
            Self::Custom(f) => f(source),
        }
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientAddr => f.write_str("ClientAddr"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Default derivation: the forwarded list names the original client first;
/// an empty or all-whitespace forwarded value falls through to the next
/// source.
fn client_addr(source: &dyn HeaderSource) -> String {
    if let Some(forwarded) = source.header(FORWARDED_FOR) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    match source.header(REAL_ADDR) {
        Some(addr) => addr.to_string(),
        None => UNKNOWN_KEY.to_string(),
    }
}
