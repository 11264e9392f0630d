//! The bare key/value boundary approval records are stored behind.
//!
//! Backends only offer single-key `get`/`set`/`delete` plus an unfiltered, paginated
//! `list`; anything smarter (prefix scans, index maintenance) is done by callers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::Row;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("key/value backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<(), KvError>;
    /// Up to `limit` keys starting at `offset`, ascending, across the whole keyspace.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<String>, KvError>;
}

/// Pages through the whole keyspace and keeps the keys starting with `prefix`.
///
/// Keys written or removed while the scan runs may shift page boundaries, so a
/// concurrently modified key can be missed or seen twice.
pub async fn scan_prefix(
    store: &dyn KeyValueStore,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<String>, KvError> {
    let page_size = page_size.max(1);
    let mut matched = Vec::new();
    let mut offset = 0;

    loop {
        let page = store.list(offset, page_size).await?;
        let fetched = page.len();
        matched.extend(page.into_iter().filter(|key| key.starts_with(prefix)));
        if fetched < page_size {
            break;
        }
        offset += fetched;
    }

    Ok(matched)
}

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryKeyValueStore {
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<String>, KvError> {
        let entries = self.entries.read().await;
        Ok(entries.keys().skip(offset).take(limit).cloned().collect())
    }
}

pub struct SqlKeyValueStore {
    pool: DbPool,
}

impl SqlKeyValueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl KeyValueStore for SqlKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let row = sqlx::query("SELECT value FROM kv_entry WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(r.try_get::<Vec<u8>, _>("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        sqlx::query(
            "INSERT INTO kv_entry (key, value, updated_at)
             VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        sqlx::query("DELETE FROM kv_entry WHERE key = ?").bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<String>, KvError> {
        let rows = sqlx::query("SELECT key FROM kv_entry ORDER BY key ASC LIMIT ? OFFSET ?")
            .bind(to_sql_count(limit))
            .bind(to_sql_count(offset))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| row.try_get::<String, _>("key").map_err(KvError::from)).collect()
    }
}
