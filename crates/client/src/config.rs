//! Client configuration
//!
//! Base URL, timeouts, retry bounds, and cache windows. Values mirror the
//! mobile client defaults: 10s request timeout, 2 automatic retries,
//! 5 minute staleness window, 10 minute cache horizon.

use std::time::Duration;

/// Configuration for the API client and query cache
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL for the API (e.g., "https://api.oculara.app/api")
    pub base_url: String,
    /// Timeout for individual HTTP requests
    pub timeout: Duration,
    /// Automatic query-layer retries on transient failure
    pub retry_attempts: u32,
    /// Base delay for exponential retry backoff
    pub retry_backoff: Duration,
    /// Default staleness window: cached data older than this is refetched
    /// on access
    pub stale_time: Duration,
    /// GC horizon: unobserved cache entries are evicted this long after
    /// their last access
    pub cache_time: Duration,
    /// Whether `/auth/refresh` may rotate the refresh token. When enabled
    /// and the response carries a new refresh token, the stored pair is
    /// replaced; otherwise only the access token is updated.
    pub refresh_rotation: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000/api".to_string(),
            timeout: Duration::from_secs(10),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(200),
            stale_time: Duration::from_secs(5 * 60),
            cache_time: Duration::from_secs(10 * 60),
            refresh_rotation: false,
        }
    }
}

impl ApiConfig {
    /// Start building a configuration
    pub fn builder() -> ApiConfigBuilder {
        ApiConfigBuilder::default()
    }

    /// Build a configuration from the environment.
    ///
    /// `OCULARA_API_URL` overrides the base URL; everything else keeps
    /// its default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("OCULARA_API_URL") {
            config.base_url = url;
        }
        config
    }
}

/// Builder for [`ApiConfig`]
#[derive(Debug, Default)]
pub struct ApiConfigBuilder {
    config: ApiConfig,
}

impl ApiConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Number of automatic retries after the initial attempt
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.config.stale_time = stale_time;
        self
    }

    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.config.cache_time = cache_time;
        self
    }

    pub fn refresh_rotation(mut self, enabled: bool) -> Self {
        self.config.refresh_rotation = enabled;
        self
    }

    pub fn build(self) -> ApiConfig {
        self.config
    }
}
