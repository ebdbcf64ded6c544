//! Redis store backend.
//!
//! Records are Redis hashes: `body`, `type`, and `code` fields written with
//! `HSET`, read back with `HGETALL`, and expired with `EXPIRE`. Only the
//! fields present on the record are written.
//!
//! Availability tracking mirrors the connect/error event model of classic
//! Redis clients: the `connected` flag flips true when the connection is
//! established or a command succeeds, and false when a command fails. The
//! underlying [`ConnectionManager`] re-establishes the connection in the
//! background after a failure, so a later successful command flips the flag
//! back on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use tracing::{debug, info, warn};

use super::{CacheRecord, Store, StoreError};

const FIELD_BODY: &str = "body";
const FIELD_TYPE: &str = "type";
const FIELD_CODE: &str = "code";

/// A [`Store`] backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    connected: Arc<AtomicBool>,
}

impl RedisStore {
    /// Establishes a connection to the given Redis server.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the initial connection cannot be
    /// established. Transient failures after a successful connect do not
    /// surface here; they flip [`is_connected`](Store::is_connected) instead.
    pub async fn connect(
        host: &str,
        port: u16,
        auth_pass: Option<&str>,
    ) -> Result<Self, StoreError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_owned(), port),
            redis: RedisConnectionInfo {
                password: auth_pass.map(str::to_owned),
                ..RedisConnectionInfo::default()
            },
        };
        let client = redis::Client::open(info).map_err(backend)?;
        let manager = ConnectionManager::new(client).await.map_err(backend)?;

        info!(host, port, "connected to redis");
        Ok(Self {
            manager,
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    fn mark_ok(&self) {
        if !self.connected.swap(true, Ordering::Relaxed) {
            info!("redis connection restored");
        }
    }

    fn mark_failed(&self, err: RedisError) -> StoreError {
        if self.connected.swap(false, Ordering::Relaxed) {
            warn!(error = %err, "redis connection lost");
        }
        StoreError::Backend(Box::new(err))
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get_record(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        let mut con = self.manager.clone();
        let fields: HashMap<String, Vec<u8>> = con
            .hgetall(key)
            .await
            .map_err(|e| self.mark_failed(e))?;
        self.mark_ok();

        // HGETALL yields an empty hash for a missing key.
        if fields.is_empty() {
            return Ok(None);
        }
        match record_from_fields(fields) {
            Some(record) => Ok(Some(record)),
            None => {
                debug!(key, "dropping hash without a body field");
                Ok(None)
            }
        }
    }

    async fn set_record(&self, key: &str, record: &CacheRecord) -> Result<(), StoreError> {
        let items = record_to_fields(record);
        let mut con = self.manager.clone();
        let () = con
            .hset_multiple(key, &items)
            .await
            .map_err(|e| self.mark_failed(e))?;
        self.mark_ok();
        Ok(())
    }

    async fn set_expiry(&self, key: &str, seconds: i64) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let () = con
            .expire(key, seconds)
            .await
            .map_err(|e| self.mark_failed(e))?;
        self.mark_ok();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

fn backend(err: RedisError) -> StoreError {
    StoreError::Backend(Box::new(err))
}

// Only present fields are written; `type` and `code` never appear as empty
// placeholders.
fn record_to_fields(record: &CacheRecord) -> Vec<(&'static str, Vec<u8>)> {
    let mut items = vec![(FIELD_BODY, record.body.to_vec())];
    if let Some(content_type) = &record.content_type {
        items.push((FIELD_TYPE, content_type.clone().into_bytes()));
    }
    if let Some(status) = record.status {
        items.push((FIELD_CODE, status.to_string().into_bytes()));
    }
    items
}

fn record_from_fields(mut fields: HashMap<String, Vec<u8>>) -> Option<CacheRecord> {
    let body = fields.remove(FIELD_BODY)?;
    let content_type = fields
        .remove(FIELD_TYPE)
        .and_then(|v| String::from_utf8(v).ok());
    let status = fields
        .remove(FIELD_CODE)
        .and_then(|v| String::from_utf8(v).ok())
        .and_then(|s| s.parse::<u16>().ok());
    Some(CacheRecord {
        body: Bytes::from(body),
        content_type,
        status,
    })
}
