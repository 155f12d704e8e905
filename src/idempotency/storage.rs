use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Hash field holding the record status.
pub const STATUS_FIELD: &str = "status";
/// Hash field holding the serialized result.
pub const VALUE_FIELD: &str = "value";

/// Status of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    /// No record exists for the key.
    Unset,
    /// Claimed; the guarded operation has not published a result yet.
    Started,
    /// A result has been published.
    Completed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::Unset => "unset",
            IdempotencyStatus::Started => "started",
            IdempotencyStatus::Completed => "completed",
        }
    }

    /// Parses the stored status field. A missing field means `Unset`.
    pub fn from_field(raw: Option<&[u8]>) -> Result<Self> {
        match raw {
            None => Ok(IdempotencyStatus::Unset),
            Some(b"started") => Ok(IdempotencyStatus::Started),
            Some(b"completed") => Ok(IdempotencyStatus::Completed),
            Some(other) => Err(AppError::Corrupt(format!(
                "unknown status '{}'",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

/// Decoded view of a stored idempotency record.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord<T> {
    pub key: String,
    pub status: IdempotencyStatus,
    pub value: Option<T>,
}

impl<T> IdempotencyRecord<T> {
    pub fn is_completed(&self) -> bool {
        self.status == IdempotencyStatus::Completed
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == IdempotencyStatus::Started
    }
}

/// Shared key-value store holding idempotency records as small hashes.
///
/// Implementations must make `set_if_absent` atomic across every process that
/// shares the store: it is the only mutual exclusion the coordinator relies on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Sets `field` on the hash at `key` only if the field does not exist yet.
    /// Returns true if this call created it.
    async fn set_if_absent(&self, key: &str, field: &str, value: &[u8]) -> Result<bool>;

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;

    /// Unconditionally overwrites `field` on the hash at `key`.
    async fn set_field(&self, key: &str, field: &str, value: &[u8]) -> Result<()>;

    /// Name used in logs and metrics labels.
    fn name(&self) -> &'static str;
}

/// Redis-backed store using HSETNX / HGET / HSET.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    client: redis::Client,
}

impl RedisKeyValueStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::from)
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn set_if_absent(&self, key: &str, field: &str, value: &[u8]) -> Result<bool> {
        let mut conn = self.connection().await?;
        let created: bool = conn.hset_nx(key, field, value).await?;
        Ok(created)
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn set_field(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Process-local store for development and tests.
///
/// Only gives cross-caller exclusion inside a single process.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    hashes: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hashes currently stored.
    pub async fn len(&self) -> usize {
        self.hashes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.hashes.lock().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_if_absent(&self, key: &str, field: &str, value: &[u8]) -> Result<bool> {
        let mut hashes = self.hashes.lock().await;
        let hash = hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_vec());
        Ok(true)
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let hashes = self.hashes.lock().await;
        Ok(hashes.get(key).and_then(|hash| hash.get(field)).cloned())
    }

    async fn set_field(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let mut hashes = self.hashes.lock().await;
        hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_field() {
        assert_eq!(
            IdempotencyStatus::from_field(None).unwrap(),
            IdempotencyStatus::Unset
        );
        assert_eq!(
            IdempotencyStatus::from_field(Some(b"started")).unwrap(),
            IdempotencyStatus::Started
        );
        assert_eq!(
            IdempotencyStatus::from_field(Some(b"completed")).unwrap(),
            IdempotencyStatus::Completed
        );
        assert!(matches!(
            IdempotencyStatus::from_field(Some(b"bogus")),
            Err(AppError::Corrupt(_))
        ));
    }

    #[test]
    fn test_status_round_trips_through_as_str() {
        for status in [IdempotencyStatus::Started, IdempotencyStatus::Completed] {
            let parsed = IdempotencyStatus::from_field(Some(status.as_str().as_bytes())).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[tokio::test]
    async fn test_in_memory_set_if_absent() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.set_if_absent("k", "status", b"started").await.unwrap());
        assert!(!store.set_if_absent("k", "status", b"started").await.unwrap());
        // Another field on the same hash is independent.
        assert!(store.set_if_absent("k", "other", b"x").await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_in_memory_get_and_set_field() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.get_field("k", "value").await.unwrap().is_none());

        store.set_field("k", "value", b"one").await.unwrap();
        store.set_field("k", "value", b"two").await.unwrap();

        assert_eq!(
            store.get_field("k", "value").await.unwrap(),
            Some(b"two".to_vec())
        );
        assert!(store.get_field("missing", "value").await.unwrap().is_none());
    }
}
