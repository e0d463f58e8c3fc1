use crate::audit::AuditSink;
use crate::error::{AppError, Result};
use crate::idempotency::coordinator::{CheckOutcome, IdempotencyCoordinator};
use crate::idempotency::storage::KeyedRecordStore;
use crate::observability::logging::mask_sensitive;
use crate::observability::metrics::{record_check_outcome, record_wait_duration};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Notify;

/// Boundary policy configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub ttl_seconds: i64,
    pub poll_interval: std::time::Duration,
    pub max_poll_attempts: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 60,
            poll_interval: std::time::Duration::from_millis(100),
            max_poll_attempts: 50,
        }
    }
}

/// What the caller is allowed to do after admission.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Run the protected operation, then call `complete`.
    Execute,
    /// Short-circuit with a previously computed response (cache hit).
    Replay(serde_json::Value),
}

/// Turns coordinator outcomes into caller-visible behavior: proceed,
/// short-circuit with the stored response, reject, or wait-then-resolve.
///
/// Waiters poll the store without holding any lock; a per-key `Notify`
/// additionally wakes local waiters the moment `complete` runs in-process,
/// ahead of the next poll tick. Caller cancellation propagates by dropping
/// the `admit` future.
pub struct RequestGate {
    coordinator: IdempotencyCoordinator,
    store: Arc<dyn KeyedRecordStore>,
    audit: Arc<dyn AuditSink>,
    config: GateConfig,
    waiters: Mutex<HashMap<String, Arc<Notify>>>,
}

impl RequestGate {
    pub fn new(
        store: Arc<dyn KeyedRecordStore>,
        audit: Arc<dyn AuditSink>,
        config: GateConfig,
    ) -> Self {
        Self {
            coordinator: IdempotencyCoordinator::new(Arc::clone(&store), Arc::clone(&audit)),
            store,
            audit,
            config,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Rejects requests that carry no usable idempotency key. Runs before
    /// any body inspection so a keyless request is always answered the same
    /// way, valid body or not.
    pub fn require_key<'a>(&self, key: Option<&'a str>) -> Result<&'a str> {
        match key.filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(key),
            None => {
                self.audit.record("NO_KEY", json!({}));
                record_check_outcome("missing_key");
                Err(AppError::Validation(
                    "Idempotency-Key header is required".to_string(),
                ))
            }
        }
    }

    /// Admits a request under its idempotency key.
    pub async fn admit(&self, key: Option<&str>, payload: &serde_json::Value) -> Result<Admission> {
        let key = self.require_key(key)?;

        match self
            .coordinator
            .check_or_create(key, payload, self.config.ttl_seconds)
            .await?
        {
            CheckOutcome::New => Ok(Admission::Execute),
            CheckOutcome::Replay(response) => Ok(Admission::Replay(response)),
            CheckOutcome::Conflict => Err(AppError::Conflict(
                "idempotency key reused for a different request body".to_string(),
            )),
            CheckOutcome::InProgress => {
                let response = self.wait_for_completion(key).await?;
                Ok(Admission::Replay(response))
            }
        }
    }

    /// Records the operation's response and wakes any local waiters.
    pub async fn complete(&self, key: &str, response: serde_json::Value) -> Result<()> {
        self.coordinator.complete(key, response).await?;
        if let Ok(mut waiters) = self.waiters.lock() {
            if let Some(notify) = waiters.remove(key) {
                notify.notify_waiters();
            }
        }
        Ok(())
    }

    /// Bounded wait for a concurrently in-flight duplicate. Polls the store
    /// each interval up to the configured attempt budget; exits early when
    /// the record vanishes (owner's TTL elapsed mid-flight) since no
    /// completion can arrive for it anymore.
    async fn wait_for_completion(&self, key: &str) -> Result<serde_json::Value> {
        // Registry bookkeeping lives in the guard's Drop so it also runs
        // when a cancelled caller drops this future mid-wait.
        let waiter = WaiterGuard {
            gate: self,
            key: key.to_string(),
            notify: self.subscribe(key),
        };
        let started = Instant::now();
        tracing::debug!(key = %mask_sensitive(key, 4), "waiting for in-flight duplicate");

        let mut attempts = 0;
        while attempts < self.config.max_poll_attempts {
            tokio::select! {
                _ = waiter.notify.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            attempts += 1;

            match self.store.get(key).await? {
                Some(record) if record.is_completed() => {
                    if let Some(response) = record.response {
                        record_wait_duration(started.elapsed().as_secs_f64() * 1000.0, true);
                        return Ok(response);
                    }
                }
                Some(_) => {}
                None => break,
            }
        }

        record_wait_duration(started.elapsed().as_secs_f64() * 1000.0, false);
        Err(AppError::Timeout(
            "request with this idempotency key is still in progress".to_string(),
        ))
    }

    /// Number of keys with registered waiters. Mainly for tests.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().map(|waiters| waiters.len()).unwrap_or(0)
    }

    fn subscribe(&self, key: &str) -> Arc<Notify> {
        match self.waiters.lock() {
            Ok(mut waiters) => Arc::clone(
                waiters
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Notify::new())),
            ),
            // Poisoned registry only costs the early wakeup; polling still works.
            Err(_) => Arc::new(Notify::new()),
        }
    }

    fn release(&self, key: &str, notify: &Arc<Notify>) {
        if let Ok(mut waiters) = self.waiters.lock() {
            if let Some(existing) = waiters.get(key) {
                // Last waiter out drops the registry entry.
                if Arc::ptr_eq(existing, notify) && Arc::strong_count(existing) <= 2 {
                    waiters.remove(key);
                }
            }
        }
    }
}

/// Removes the waiter's registry entry on every exit path, including a
/// caller whose connection was cancelled and whose wait future was dropped.
struct WaiterGuard<'a> {
    gate: &'a RequestGate,
    key: String,
    notify: Arc<Notify>,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.key, &self.notify);
    }
}
