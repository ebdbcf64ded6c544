//! In-process store backend.
//!
//! A `HashMap` of records with per-key expiry instants. Used by tests and
//! demos, and usable as a single-process cache when no Redis is available.
//! Expiry is checked lazily on read; an expired key behaves exactly like a
//! missing one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CacheRecord, Store, StoreError};

struct Entry {
    record: CacheRecord,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// An always-connected in-memory [`Store`].
///
/// Cloning is cheap and clones share the same underlying map, so a test can
/// keep a handle to inspect what the middleware wrote.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().expect("memory store poisoned");
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Returns `true` when no live records exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_record(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        let mut entries = self.entries.lock().expect("memory store poisoned");
        match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.record.clone())),
            None => Ok(None),
        }
    }

    async fn set_record(&self, key: &str, record: &CacheRecord) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("memory store poisoned");
        entries.insert(
            key.to_owned(),
            Entry {
                record: record.clone(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_expiry(&self, key: &str, seconds: i64) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("memory store poisoned");
        if seconds <= 0 {
            entries.remove(key);
            return Ok(());
        }
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds as u64));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get_record("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn record_fields_round_trip() {
        let store = MemoryStore::new();
        let record = CacheRecord::new(&b"payload"[..])
            .content_type("text/plain")
            .status(200);
        store.set_record("k", &record).await.unwrap();

        let read = store.get_record("k").await.unwrap().unwrap();
        assert_eq!(read, record);
    }

    #[tokio::test]
    async fn absent_fields_stay_absent() {
        let store = MemoryStore::new();
        store
            .set_record("k", &CacheRecord::new(&b"body-only"[..]))
            .await
            .unwrap();

        let read = store.get_record("k").await.unwrap().unwrap();
        assert_eq!(read.content_type, None);
        assert_eq!(read.status, None);
    }

    #[tokio::test]
    async fn non_positive_expiry_removes_key() {
        let store = MemoryStore::new();
        store
            .set_record("k", &CacheRecord::new(&b"x"[..]))
            .await
            .unwrap();
        store.set_expiry("k", 0).await.unwrap();
        assert_eq!(store.get_record("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_key_behaves_as_miss() {
        let store = MemoryStore::new();
        store
            .set_record("k", &CacheRecord::new(&b"x"[..]))
            .await
            .unwrap();
        store.set_expiry("k", 1).await.unwrap();

        // Force the deadline into the past instead of sleeping.
        {
            let mut entries = store.entries.lock().unwrap();
            entries.get_mut("k").unwrap().expires_at =
                Some(Instant::now() - Duration::from_secs(1));
        }
        assert_eq!(store.get_record("k").await.unwrap(), None);
        assert!(store.is_empty());
    }
}
