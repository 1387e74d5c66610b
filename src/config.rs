//! Configuration for Tidegate limiters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{Result, TidegateError};

/// Default window width when none is configured: 15 minutes.
pub const DEFAULT_WINDOW_MS: i64 = 900_000;
/// Default quota when none is configured.
pub const DEFAULT_MAX: u64 = 100;

/// Configuration for a single rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Width of the trailing window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,

    /// Maximum admitted calls inside any trailing window, per key
    #[serde(default = "default_max")]
    pub max: u64,

    /// Message returned to rejected callers
    #[serde(default = "default_message")]
    pub message: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max: default_max(),
            message: default_message(),
        }
    }
}

fn default_window_ms() -> i64 {
    DEFAULT_WINDOW_MS
}

fn default_max() -> u64 {
    DEFAULT_MAX
}

fn default_message() -> String {
    "Too many requests, please try again later.".to_string()
}

impl LimiterConfig {
    /// Create a configuration with explicit window and quota, keeping the
    /// default rejection message.
    pub fn new(window_ms: i64, max: u64) -> Self {
        Self {
            window_ms,
            max,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// The window and quota must both be positive; anything else is a
    /// programmer error surfaced at construction time.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms <= 0 {
            return Err(TidegateError::Config(format!(
                "window_ms must be positive, got {}",
                self.window_ms
            )));
        }
        if self.max == 0 {
            return Err(TidegateError::Config(
                "max must be positive, got 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A set of named limiter configurations.
///
/// Deployments typically carry one lenient general-purpose bucket and a few
/// strict per-endpoint buckets (e.g. a contact form allowing a handful of
/// submissions per minute).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterSetConfig {
    /// Map of bucket name to limiter configuration
    #[serde(default)]
    pub buckets: HashMap<String, LimiterConfig>,
}

impl LimiterSetConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TidegateError::Config(format!("Failed to parse limiter config: {}", e)))
    }
}
