use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::QueueError;

/// Cached queue snapshots expire after a day.
pub const QUEUE_CACHE_TTL_SECONDS: u64 = 86_400;

pub fn queue_cache_key(clinic_id: &str, date: NaiveDate) -> String {
    format!("queue:{}:{}", clinic_id, date.format("%Y-%m-%d"))
}

/// Last projected queue per clinic and day, for cheap reads by displays.
#[async_trait]
pub trait QueueCache: Send + Sync {
    async fn put(&self, clinic_id: &str, date: NaiveDate, snapshot: &Value) -> Result<(), QueueError>;

    /// Stores the snapshot only when nothing is cached for the day yet.
    /// Returns whether it was written.
    async fn put_if_absent(&self, clinic_id: &str, date: NaiveDate, snapshot: &Value) -> Result<bool, QueueError>;

    async fn get(&self, clinic_id: &str, date: NaiveDate) -> Result<Option<Value>, QueueError>;
}

pub struct RedisQueueCache {
    pool: Pool,
}

impl RedisQueueCache {
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<Connection, QueueError> {
        self.pool.get().await.map_err(|e| QueueError::PoolError(e.to_string()))
    }
}

/// Builds a pool and checks it with a PING.
pub async fn create_redis_pool(redis_url: &str) -> Result<Pool, QueueError> {
    let pool = Config::from_url(redis_url)
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| QueueError::PoolError(format!("Pool creation error: {}", e)))?;

    let mut conn = pool.get().await.map_err(|e| QueueError::PoolError(e.to_string()))?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    Ok(pool)
}

#[async_trait]
impl QueueCache for RedisQueueCache {
    async fn put(&self, clinic_id: &str, date: NaiveDate, snapshot: &Value) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let key = queue_cache_key(clinic_id, date);
        let payload = serde_json::to_string(snapshot)?;

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("EX")
            .arg(QUEUE_CACHE_TTL_SECONDS)
            .query_async(&mut conn)
            .await?;

        debug!("Cached queue snapshot {}", key);
        Ok(())
    }

    async fn put_if_absent(&self, clinic_id: &str, date: NaiveDate, snapshot: &Value) -> Result<bool, QueueError> {
        let mut conn = self.connection().await?;
        let key = queue_cache_key(clinic_id, date);
        let payload = serde_json::to_string(snapshot)?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(QUEUE_CACHE_TTL_SECONDS)
            .query_async(&mut conn)
            .await?;

        let written = reply.is_some();
        if !written {
            debug!("Queue snapshot {} already cached, keeping it", key);
        }
        Ok(written)
    }

    async fn get(&self, clinic_id: &str, date: NaiveDate) -> Result<Option<Value>, QueueError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(queue_cache_key(clinic_id, date)).await?;

        match raw {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MemoryQueueCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryQueueCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueCache for MemoryQueueCache {
    async fn put(&self, clinic_id: &str, date: NaiveDate, snapshot: &Value) -> Result<(), QueueError> {
        self.entries
            .write()
            .await
            .insert(queue_cache_key(clinic_id, date), snapshot.clone());
        Ok(())
    }

    async fn put_if_absent(&self, clinic_id: &str, date: NaiveDate, snapshot: &Value) -> Result<bool, QueueError> {
        let mut entries = self.entries.write().await;
        match entries.entry(queue_cache_key(clinic_id, date)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(snapshot.clone());
                Ok(true)
            }
        }
    }

    async fn get(&self, clinic_id: &str, date: NaiveDate) -> Result<Option<Value>, QueueError> {
        Ok(self.entries.read().await.get(&queue_cache_key(clinic_id, date)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_scoped_by_clinic_and_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(queue_cache_key("c1", date), "queue:c1:2024-03-01");
    }

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryQueueCache::new();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        assert!(cache.get("c1", date).await.unwrap().is_none());
        cache.put("c1", date, &json!({"total_waiting": 2})).await.unwrap();
        assert_eq!(cache.get("c1", date).await.unwrap(), Some(json!({"total_waiting": 2})));
        assert!(cache.get("c2", date).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_if_absent_keeps_the_existing_snapshot() {
        let cache = MemoryQueueCache::new();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        assert!(cache.put_if_absent("c1", date, &json!({"total_waiting": 0})).await.unwrap());
        cache.put("c1", date, &json!({"total_waiting": 1})).await.unwrap();
        assert!(!cache.put_if_absent("c1", date, &json!({"total_waiting": 0})).await.unwrap());

        assert_eq!(cache.get("c1", date).await.unwrap(), Some(json!({"total_waiting": 1})));
    }
}
