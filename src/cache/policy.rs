//! Cacheability policy — which final status codes may be persisted.

use std::fmt;
use std::sync::Arc;

/// Rule disqualifying responses from caching by status code.
///
/// Evaluated against the *final* status at response time, never at request
/// entry, since handlers may set their status late.
#[derive(Clone)]
pub enum ExcludeRule {
    /// Exclude every status greater than or equal to the threshold.
    Threshold(u16),
    /// Exclude exactly the listed statuses.
    Codes(Vec<u16>),
    /// Exclude statuses for which the predicate returns `true`.
    Predicate(Arc<dyn Fn(u16) -> bool + Send + Sync>),
}

impl ExcludeRule {
    /// Builds a predicate rule from a closure.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }
}

impl Default for ExcludeRule {
    /// Excludes 5xx responses.
    fn default() -> Self {
        Self::Threshold(500)
    }
}

impl fmt::Debug for ExcludeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threshold(t) => f.debug_tuple("Threshold").field(t).finish(),
            Self::Codes(codes) => f.debug_tuple("Codes").field(codes).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Decides whether a response with the given status may be stored.
///
/// No rule means everything is cacheable.
pub fn is_cacheable(rule: Option<&ExcludeRule>, status: u16) -> bool {
    match rule {
        None => true,
        Some(ExcludeRule::Threshold(threshold)) => status < *threshold,
        Some(ExcludeRule::Codes(codes)) => !codes.contains(&status),
        Some(ExcludeRule::Predicate(excluded)) => !excluded(status),
    }
}
