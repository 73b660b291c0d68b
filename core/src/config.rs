//! Client configuration.
//!
//! Loaded from environment variables or a TOML document. Every field has a
//! default, so a partial document (or a partial environment) is enough.
//!
//! ## Environment Variables
//! - `HUBSPOT_BASE_URL`: API root, default `https://api.hubapi.com`
//! - `HUBSPOT_ACCESS_TOKEN`: private app or OAuth access token
//! - `HUBSPOT_RATE_LIMIT_PAUSE_MS`: pause before the single 429 retry
//! - `HUBSPOT_MAX_PAGES`: page limit for one pagination loop

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";
pub const DAILY_REMAINING_HEADER: &str = "X-HubSpot-RateLimit-Daily-Remaining";
pub const DEFAULT_RATE_LIMIT_PAUSE_MS: u64 = 1_000;
pub const OBJECT_BATCH_SIZE: usize = 100;
pub const ASSOCIATION_BATCH_SIZE: usize = 10_000;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub rate_limit_pause_ms: u64,
    pub daily_remaining_header: String,
    /// `None` keeps paginating until the server returns no cursor.
    pub max_pages: Option<usize>,
    pub object_batch_size: usize,
    pub association_batch_size: usize,
}

/// Stand-in printed wherever a token would appear in `Debug` output.
pub(crate) fn redact(token: &Option<String>) -> Option<&'static str> {
    token.as_ref().map(|_| "***")
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &redact(&self.access_token))
            .field("rate_limit_pause_ms", &self.rate_limit_pause_ms)
            .field("daily_remaining_header", &self.daily_remaining_header)
            .field("max_pages", &self.max_pages)
            .field("object_batch_size", &self.object_batch_size)
            .field("association_batch_size", &self.association_batch_size)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            rate_limit_pause_ms: DEFAULT_RATE_LIMIT_PAUSE_MS,
            daily_remaining_header: DAILY_REMAINING_HEADER.to_string(),
            max_pages: None,
            object_batch_size: OBJECT_BATCH_SIZE,
            association_batch_size: ASSOCIATION_BATCH_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_rate_limit_pause(mut self, pause: Duration) -> Self {
        self.rate_limit_pause_ms = pause.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    #[must_use]
    pub fn with_object_batch_size(mut self, size: usize) -> Self {
        self.object_batch_size = size;
        self
    }

    pub fn rate_limit_pause(&self) -> Duration {
        Duration::from_millis(self.rate_limit_pause_ms)
    }

    /// Load from `HUBSPOT_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let mut config = Self::default();
        if let Some(base_url) = lookup("HUBSPOT_BASE_URL") {
            config.base_url = base_url;
        }
        config.access_token = lookup("HUBSPOT_ACCESS_TOKEN").filter(|t| !t.is_empty());
        if let Some(pause) = lookup("HUBSPOT_RATE_LIMIT_PAUSE_MS") {
            config.rate_limit_pause_ms = pause
                .parse()
                .map_err(|e| ApiError::Config(format!("invalid HUBSPOT_RATE_LIMIT_PAUSE_MS: {e}")))?;
        }
        if let Some(max_pages) = lookup("HUBSPOT_MAX_PAGES") {
            config.max_pages = Some(
                max_pages
                    .parse()
                    .map_err(|e| ApiError::Config(format!("invalid HUBSPOT_MAX_PAGES: {e}")))?,
            );
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ApiError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ApiError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.base_url.trim().is_empty() {
            return Err(ApiError::Config("base_url must not be empty".to_string()));
        }
        if self.object_batch_size == 0 || self.association_batch_size == 0 {
            return Err(ApiError::Config("batch sizes must be at least 1".to_string()));
        }
        if self.max_pages == Some(0) {
            return Err(ApiError::Config("max_pages must be at least 1".to_string()));
        }
        Ok(())
    }
}
