//! Configuration types for the streaming client

use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Default platform API URL
pub const DEFAULT_API_URL: &str = "https://api.mirage.ai";

/// Environment variable overriding the platform API URL
pub const API_URL_ENV: &str = "MIRAGE_API_URL";

/// Main configuration for the streaming client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key for authentication (required)
    pub api_key: String,

    /// Platform API base URL
    pub api_url: String,

    /// Development overrides (direct signaling connection)
    pub dev: DevConfig,

    /// Handshake retry policy
    pub retry: RetryPolicy,

    /// How long `start_stream` waits for the streamer to pick up the stream
    /// (zero fails immediately when no acknowledgment arrives)
    pub queue_timeout: Duration,
}

/// Development settings bypassing the session broker
///
/// When `signaling_url` is set the client skips credential exchange and
/// session brokering and connects straight to the given signaling endpoint.
#[derive(Debug, Clone, Default)]
pub struct DevConfig {
    /// Direct signaling endpoint (bypasses the API)
    pub signaling_url: Option<String>,

    /// Session ID to use with `signaling_url` (required when it is set)
    pub session_id: Option<String>,
}

impl ClientConfig {
    /// Create a configuration with defaults for the given API key
    ///
    /// The API URL defaults to production, overridable via the
    /// `MIRAGE_API_URL` environment variable.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            dev: DevConfig::default(),
            retry: RetryPolicy::default(),
            queue_timeout: Duration::from_secs(30),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() && self.dev.signaling_url.is_none() {
            return Err(Error::InvalidConfig("api_key is required".to_string()));
        }

        if self.dev.signaling_url.is_some() && self.dev.session_id.is_none() {
            return Err(Error::InvalidConfig(
                "dev.session_id is required when dev.signaling_url is set".to_string(),
            ));
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "api_url must start with http:// or https://, got: {}",
                self.api_url
            )));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }

        Ok(())
    }
}
