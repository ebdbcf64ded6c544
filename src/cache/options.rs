//! Per-route key and TTL strategies.
//!
//! Both knobs accept either a literal or a function of the request, modeled
//! as two-variant strategy types resolved once per request.

use std::fmt;
use std::sync::Arc;

use crate::Request;

/// Default TTL, in seconds, for routes that configure none.
pub const DEFAULT_TTL_SECS: i64 = 60;

/// Cache key strategy for a route.
#[derive(Clone)]
pub enum KeySpec {
    /// Fixed key, used verbatim when non-empty.
    Literal(String),
    /// Key computed from the request; the return value is used verbatim.
    Computed(Arc<dyn Fn(&Request) -> String + Send + Sync>),
}

impl KeySpec {
    /// Builds a computed key from a closure.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }
}

impl From<&str> for KeySpec {
    fn from(key: &str) -> Self {
        Self::Literal(key.to_owned())
    }
}

impl From<String> for KeySpec {
    fn from(key: String) -> Self {
        Self::Literal(key)
    }
}

impl fmt::Debug for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(key) => f.debug_tuple("Literal").field(key).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// TTL strategy for a route, in seconds.
#[derive(Clone)]
pub enum TtlSpec {
    /// Fixed TTL.
    Literal(i64),
    /// TTL computed from the request. The return value is used as-is — the
    /// middleware performs no coercion or clamping.
    Computed(Arc<dyn Fn(&Request) -> i64 + Send + Sync>),
}

impl TtlSpec {
    /// Builds a computed TTL from a closure.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Request) -> i64 + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }
}

impl From<i64> for TtlSpec {
    fn from(seconds: i64) -> Self {
        Self::Literal(seconds)
    }
}

impl fmt::Debug for TtlSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(secs) => f.debug_tuple("Literal").field(secs).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Per-route cache configuration passed to
/// [`ResponseCache::route`](super::ResponseCache::route).
///
/// # Examples
///
/// ```
/// use rescache::cache::RouteOptions;
///
/// let fixed = RouteOptions::new().key("weather:today").expire(30);
/// let dynamic = RouteOptions::new()
///     .key_fn(|req| format!("user:{}", req.query_param("id").unwrap_or("anon")))
///     .expire_fn(|req| if req.path().starts_with("/hot") { 5 } else { 300 });
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub(crate) key: Option<KeySpec>,
    pub(crate) expire: Option<TtlSpec>,
}

impl RouteOptions {
    /// Route options with default key derivation and the default TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a literal cache key. An empty string falls back to the default
    /// derivation scheme.
    #[must_use]
    pub fn key(mut self, key: impl Into<KeySpec>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Derives the cache key from the request.
    #[must_use]
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.key = Some(KeySpec::computed(f));
        self
    }

    /// Sets a literal TTL in seconds.
    #[must_use]
    pub fn expire(mut self, seconds: i64) -> Self {
        self.expire = Some(TtlSpec::Literal(seconds));
        self
    }

    /// Derives the TTL from the request.
    #[must_use]
    pub fn expire_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> i64 + Send + Sync + 'static,
    {
        self.expire = Some(TtlSpec::computed(f));
        self
    }

    /// Resolves the cache key for `req`.
    ///
    /// A computed key and a non-empty literal are used verbatim; everything
    /// else falls back to `{prefix}:route:{METHOD}:{original_url}`. The
    /// derivation is deterministic for a given request shape, so identical
    /// requests collide on the same key.
    pub(crate) fn resolve_key(&self, req: &Request, prefix: &str) -> String {
        match &self.key {
            Some(KeySpec::Computed(f)) => f(req),
            Some(KeySpec::Literal(key)) if !key.is_empty() => key.clone(),
            _ => default_route_key(prefix, req),
        }
    }

    /// Resolves the TTL for `req`, falling back to [`DEFAULT_TTL_SECS`].
    pub(crate) fn resolve_ttl(&self, req: &Request) -> i64 {
        match &self.expire {
            Some(TtlSpec::Literal(secs)) => *secs,
            Some(TtlSpec::Computed(f)) => f(req),
            None => DEFAULT_TTL_SECS,
        }
    }
}

/// The default key scheme: `{prefix}:route:{METHOD}:{original_url}`.
fn default_route_key(prefix: &str, req: &Request) -> String {
    format!(
        "{}:route:{}:{}",
        prefix,
        req.method().as_str(),
        req.original_url()
    )
}
