//! Named limiter buckets built from configuration.
//!
//! Deployments usually carry several independently tuned limiters: a
//! lenient general-purpose bucket plus strict ones for abuse-prone
//! endpoints. A `LimiterSet` builds them all from one configuration
//! document and hands them out by name.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::config::LimiterSetConfig;
use crate::error::{Result, TidegateError};

use super::key::HeaderSource;
use super::limiter::{Decision, RateLimiter};

/// A collection of named, independently configured rate limiters.
///
/// Every bucket owns its own keyspace: exhausting a client's quota in one
/// bucket leaves the same client untouched in every other.
pub struct LimiterSet {
    buckets: HashMap<String, RateLimiter>,
}

impl std::fmt::Debug for LimiterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterSet")
            .field("buckets", &self.buckets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LimiterSet {
    /// Build a limiter per configured bucket.
    pub fn from_config(config: LimiterSetConfig) -> Result<Self> {
        let mut buckets = HashMap::with_capacity(config.buckets.len());
        for (name, limiter_config) in config.buckets {
            let limiter = RateLimiter::new(limiter_config)
                .map_err(|e| TidegateError::Config(format!("bucket '{}': {}", name, e)))?;
            buckets.insert(name, limiter);
        }

        info!(buckets = buckets.len(), "Limiter set initialized");
        Ok(Self { buckets })
    }

    /// Load the configuration from a YAML file and build the set.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(LimiterSetConfig::from_file(path)?)
    }

    /// Get a bucket by name.
    pub fn get(&self, bucket: &str) -> Option<&RateLimiter> {
        self.buckets.get(bucket)
    }

    /// Check a request against a named bucket.
    ///
    /// Returns `None` if no bucket with that name exists; callers decide
    /// whether an unconfigured bucket means "admit" or a wiring bug.
    pub fn check<S: HeaderSource>(&self, bucket: &str, source: &S) -> Option<Decision> {
        self.buckets.get(bucket).map(|limiter| limiter.check(source))
    }

    /// Names of the configured buckets.
    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Number of configured buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the set has no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimiterConfig;
    use std::collections::HashMap as StdHashMap;

    fn headers(pairs: &[(&str, &str)]) -> StdHashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn test_config() -> LimiterSetConfig {
        let yaml = r#"
buckets:
  general:
    window_ms: 900000
    max: 100
  contact_form:
    window_ms: 60000
    max: 2
    message: "Too many contact form submissions, please try again later."
"#;
        LimiterSetConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_builds_all_buckets() {
        let set = LimiterSet::from_config(test_config()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.get("general").is_some());
        assert!(set.get("contact_form").is_some());
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn test_bucket_config_applies() {
        let set = LimiterSet::from_config(test_config()).unwrap();
        let strict = set.get("contact_form").unwrap();
        assert_eq!(strict.window_ms(), 60_000);
        assert_eq!(strict.max(), 2);
    }

    #[test]
    fn test_buckets_are_isolated() {
        let set = LimiterSet::from_config(test_config()).unwrap();
        let source = headers(&[("x-forwarded-for", "1.2.3.4")]);

        // Exhaust the strict bucket.
        assert!(set.check("contact_form", &source).unwrap().is_allowed());
        assert!(set.check("contact_form", &source).unwrap().is_allowed());
        let decision = set.check("contact_form", &source).unwrap();
        let err = decision.error().expect("strict bucket should reject");
        assert!(err.message.contains("contact form"));

        // The same client is still fine in the general bucket.
        assert!(set.check("general", &source).unwrap().is_allowed());
    }

    #[test]
    fn test_unknown_bucket_returns_none() {
        let set = LimiterSet::from_config(test_config()).unwrap();
        let source = headers(&[("x-forwarded-for", "1.2.3.4")]);
        assert!(set.check("missing", &source).is_none());
    }

    #[test]
    fn test_invalid_bucket_names_offender() {
        let mut config = LimiterSetConfig::new();
        config
            .buckets
            .insert("broken".to_string(), LimiterConfig::new(60_000, 0));

        let err = LimiterSet::from_config(config).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_empty_config_builds_empty_set() {
        let set = LimiterSet::from_config(LimiterSetConfig::new()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.bucket_names().count(), 0);
    }
}
