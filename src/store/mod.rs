//! Store abstraction — the keyed hash-record backend the cache talks to.
//!
//! The cache core only needs four things from a backend: fetch a record by
//! key, write a record's fields by key, put an expiry on a key, and say
//! whether it is currently reachable. [`Store`] captures exactly that, so the
//! middleware is indifferent to whether records live in Redis
//! ([`RedisStore`]) or in process memory ([`MemoryStore`]).

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// The unit persisted per cache key: the captured response payload plus the
/// metadata needed to replay it.
///
/// A record with an empty body is never written. `content_type` and `status`
/// are omitted from the persisted fields when absent — never stored as empty
/// placeholders — so a record that exists always implies a prior successful
/// write with at least a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    /// Raw response payload.
    pub body: Bytes,
    /// Response `Content-Type` at capture time, if one was set.
    pub content_type: Option<String>,
    /// HTTP status code at capture time.
    pub status: Option<u16>,
}

impl CacheRecord {
    /// Creates a record carrying only a body.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
            status: None,
        }
    }

    /// Sets the captured content type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the captured status code.
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has no usable connection.
    #[error("store is unavailable")]
    Unavailable,

    /// The backend reported a failure.
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// A connected, keyed hash-record store.
///
/// All operations are single round trips from the caller's perspective; the
/// trait imposes no transactional coupling between [`set_record`](Self::set_record)
/// and [`set_expiry`](Self::set_expiry).
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches the record stored at `key`, or `None` when the key is absent
    /// or expired.
    async fn get_record(&self, key: &str) -> Result<Option<CacheRecord>, StoreError>;

    /// Writes a record's present fields at `key`, replacing any previous
    /// record.
    async fn set_record(&self, key: &str, record: &CacheRecord) -> Result<(), StoreError>;

    /// Expires `key` after `seconds`. A non-positive value removes the key
    /// immediately, matching Redis `EXPIRE` semantics.
    async fn set_expiry(&self, key: &str, seconds: i64) -> Result<(), StoreError>;

    /// Whether the store is currently reachable. Callers treat `false` as
    /// "bypass caching", not as an error.
    fn is_connected(&self) -> bool;
}
