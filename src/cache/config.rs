//! Cache configuration, resolved once at connect time.

use std::env;

use super::policy::ExcludeRule;

/// Configuration for [`ResponseCache::connect`](super::ResponseCache::connect).
///
/// Connection parameters fall back to environment variables and then to fixed
/// defaults, so a bare `CacheConfig::default()` points at a local Redis.
///
/// # Environment Variables
/// - `REDIS_HOST` - server hostname (default: `localhost`)
/// - `REDIS_PORT` - server port (default: `6379`)
/// - `REDIS_PASS` - auth password (default: none)
#[derive(Clone)]
pub struct CacheConfig {
    /// When false, no store connection is made and every route middleware is
    /// a permanent passthrough.
    pub enabled: bool,
    /// Redis hostname.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Optional Redis auth password.
    pub auth_pass: Option<String>,
    /// Namespace prepended to default-scheme cache keys.
    pub prefix: String,
    /// Status-code exclusion rule. `None` makes every status cacheable.
    pub exclude: Option<ExcludeRule>,
}

impl CacheConfig {
    /// Creates a config from environment variables and defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the cache as a whole.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Overrides the Redis hostname.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Overrides the Redis port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the Redis auth password.
    #[must_use]
    pub fn auth_pass(mut self, pass: impl Into<String>) -> Self {
        self.auth_pass = Some(pass.into());
        self
    }

    /// Overrides the key namespace prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replaces the status-code exclusion rule.
    #[must_use]
    pub fn exclude(mut self, rule: ExcludeRule) -> Self {
        self.exclude = Some(rule);
        self
    }

    /// Removes the exclusion rule entirely: every status becomes cacheable.
    #[must_use]
    pub fn cache_all_statuses(mut self) -> Self {
        self.exclude = None;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_owned()),
            port: env::var("REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6379),
            auth_pass: env::var("REDIS_PASS").ok(),
            // Package-identity fallback for the key namespace.
            prefix: env!("CARGO_PKG_NAME").to_owned(),
            exclude: Some(ExcludeRule::default()),
        }
    }
}
