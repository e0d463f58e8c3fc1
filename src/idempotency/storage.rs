use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Status of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
}

/// Stored idempotency record. One live record exists per key; the
/// fingerprint is compared, never rewritten, on subsequent checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub fingerprint: String,
    pub status: IdempotencyStatus,
    pub response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(key: String, fingerprint: String, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            key,
            fingerprint,
            status: IdempotencyStatus::InProgress,
            response: None,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.status == IdempotencyStatus::Completed
    }

    fn apply(&mut self, update: &RecordUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(response) = &update.response {
            self.response = Some(response.clone());
        }
        if let Some(ttl) = update.reset_ttl_seconds {
            self.expires_at = Utc::now() + Duration::seconds(ttl);
        }
    }

    fn remaining_ttl_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// Partial update merged into an existing record. The remaining TTL is
/// preserved unless `reset_ttl_seconds` explicitly asks for a new one.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub status: Option<IdempotencyStatus>,
    pub response: Option<serde_json::Value>,
    pub reset_ttl_seconds: Option<i64>,
}

impl RecordUpdate {
    pub fn completed(response: serde_json::Value) -> Self {
        Self {
            status: Some(IdempotencyStatus::Completed),
            response: Some(response),
            reset_ttl_seconds: None,
        }
    }
}

/// TTL-keyed record store. Expired records are indistinguishable from
/// absent ones for every reader.
#[async_trait]
pub trait KeyedRecordStore: Send + Sync {
    /// Fetches the live record for a key, if any.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>>;

    /// Atomic create-if-absent. Returns true only for the caller that
    /// created the record; a concurrent loser observes false and must
    /// re-read. This single-operation atomicity is what keeps the NEW
    /// outcome unique per key under concurrency.
    async fn set(&self, record: &IdempotencyRecord) -> Result<bool>;

    /// Merges fields into the live record, preserving remaining TTL.
    /// Returns false if the key is absent or expired.
    async fn update(&self, key: &str, update: RecordUpdate) -> Result<bool>;

    /// Removes a record. Idempotent.
    async fn delete(&self, key: &str) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// In-process store
// ============================================================================

/// Process-local store backed by a mutex-guarded map. A background sweep
/// task evicts expired entries on a fixed interval; `get` re-validates
/// expiry itself so staleness is bounded by the shorter of the sweep
/// interval and the time since the last read.
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, IdempotencyRecord>>>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MemoryStore {
    /// Creates the store and spawns its eviction task. Must be called from
    /// within a tokio runtime.
    pub fn new(sweep_interval: std::time::Duration) -> Self {
        let entries: Arc<Mutex<HashMap<String, IdempotencyRecord>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let sweep_entries = Arc::clone(&entries);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let now = Utc::now();
                let removed = {
                    let mut map = match sweep_entries.lock() {
                        Ok(map) => map,
                        Err(_) => return,
                    };
                    let before = map.len();
                    map.retain(|_, record| record.expires_at >= now);
                    before - map.len()
                };
                if removed > 0 {
                    info!(removed, "swept expired idempotency records");
                }
            }
        });

        Self {
            entries,
            sweeper: Mutex::new(Some(handle)),
        }
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels the eviction task. Called once at shutdown.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, IdempotencyRecord>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::StoreUnavailable("memory store mutex poisoned".to_string()))
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl KeyedRecordStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let mut map = self.lock()?;
        match map.get(key) {
            Some(record) if record.is_expired() => {
                map.remove(key);
                Ok(None)
            }
            Some(record) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, record: &IdempotencyRecord) -> Result<bool> {
        let mut map = self.lock()?;
        match map.get(&record.key) {
            Some(existing) if !existing.is_expired() => Ok(false),
            _ => {
                map.insert(record.key.clone(), record.clone());
                Ok(true)
            }
        }
    }

    async fn update(&self, key: &str, update: RecordUpdate) -> Result<bool> {
        let mut map = self.lock()?;
        match map.get_mut(key) {
            Some(record) if !record.is_expired() => {
                record.apply(&update);
                Ok(true)
            }
            Some(_) => {
                map.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.lock()?;
        map.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Shared-cache store
// ============================================================================

/// Connection establishment policy for the Redis-backed store.
#[derive(Debug, Clone)]
pub struct RedisConnectOptions {
    pub max_retries: u32,
    pub base_delay: std::time::Duration,
    pub max_delay: std::time::Duration,
}

impl Default for RedisConnectOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: std::time::Duration::from_millis(50),
            max_delay: std::time::Duration::from_millis(2000),
        }
    }
}

/// Store backed by a shared networked cache. The connection is established
/// once at startup with bounded exponential backoff; if it is never
/// established the store stays permanently unavailable and every operation
/// fails with `StoreUnavailable`. Individual operations are never retried.
pub struct RedisRecordStore {
    conn: Option<redis::aio::MultiplexedConnection>,
    key_prefix: String,
}

impl RedisRecordStore {
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        options: RedisConnectOptions,
    ) -> Self {
        let key_prefix = key_prefix.into();
        let mut delay = options.base_delay;

        for attempt in 1..=options.max_retries {
            match Self::try_connect(url).await {
                Ok(conn) => {
                    info!(attempt, "redis connection established");
                    return Self {
                        conn: Some(conn),
                        key_prefix,
                    };
                }
                Err(e) => {
                    warn!(attempt, error = %e, "redis connection attempt failed");
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, options.max_delay);
                }
            }
        }

        error!(
            retries = options.max_retries,
            "redis connection never established; store is permanently unavailable"
        );
        Self {
            conn: None,
            key_prefix,
        }
    }

    async fn try_connect(url: &str) -> redis::RedisResult<redis::aio::MultiplexedConnection> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(conn)
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.conn.clone().ok_or_else(|| {
            AppError::StoreUnavailable("redis connection was never established".to_string())
        })
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    fn store_err(e: redis::RedisError) -> AppError {
        AppError::StoreUnavailable(e.to_string())
    }
}

#[async_trait]
impl KeyedRecordStore for RedisRecordStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let mut conn = self.conn()?;
        let value: Option<String> = conn
            .get(self.cache_key(key))
            .await
            .map_err(Self::store_err)?;

        match value {
            Some(raw) => {
                let record: IdempotencyRecord = serde_json::from_str(&raw)?;
                // Redis expires the key itself; the record-level check is a
                // backstop against clock skew between writer and reader.
                if record.is_expired() {
                    Ok(None)
                } else {
                    Ok(Some(record))
                }
            }
            None => Ok(None),
        }
    }

    async fn set(&self, record: &IdempotencyRecord) -> Result<bool> {
        let mut conn = self.conn()?;
        let ttl = record.remaining_ttl_seconds();
        if ttl == 0 {
            return Ok(false);
        }
        let raw = serde_json::to_string(record)?;

        // SET NX EX in one round trip; Some("OK") means we created the key.
        let created: Option<String> = conn
            .set_options(
                self.cache_key(&record.key),
                raw,
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(ttl as usize)),
            )
            .await
            .map_err(Self::store_err)?;

        Ok(created.is_some())
    }

    async fn update(&self, key: &str, update: RecordUpdate) -> Result<bool> {
        let mut conn = self.conn()?;
        let cache_key = self.cache_key(key);

        // Read the remaining TTL first so the rewrite does not silently
        // extend or reset expiry. TTL returns -2 for absent keys and -1 for
        // keys without expiry; neither holds a live record to merge into.
        let remaining: i64 = conn.ttl(&cache_key).await.map_err(Self::store_err)?;
        if remaining <= 0 {
            return Ok(false);
        }

        let raw: Option<String> = conn.get(&cache_key).await.map_err(Self::store_err)?;
        let Some(raw) = raw else {
            return Ok(false);
        };
        let mut record: IdempotencyRecord = serde_json::from_str(&raw)?;
        record.apply(&update);

        let ttl = update.reset_ttl_seconds.unwrap_or(remaining);
        let merged = serde_json::to_string(&record)?;
        let _: () = conn
            .set_ex(&cache_key, merged, ttl as u64)
            .await
            .map_err(Self::store_err)?;

        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let _: i64 = conn
            .del(self.cache_key(key))
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
