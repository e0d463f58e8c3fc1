use crate::audit::AuditSink;
use crate::error::{AppError, Result};
use crate::idempotency::fingerprint::fingerprint_value;
use crate::idempotency::storage::{IdempotencyRecord, KeyedRecordStore, RecordUpdate};
use crate::observability::metrics::record_check_outcome;
use anyhow::anyhow;
use serde_json::json;
use std::sync::Arc;

/// Outcome of an idempotency check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// First observation of the key; the caller owns the operation.
    New,
    /// Same request is in flight elsewhere; the caller should wait.
    InProgress,
    /// The operation already completed; serve the stored response.
    Replay(serde_json::Value),
    /// The key was reused with a different request body.
    Conflict,
}

/// Stateless state machine over `(status, fingerprint)` per key. Holds no
/// state of its own beyond the store and is safely shared across requests.
pub struct IdempotencyCoordinator {
    store: Arc<dyn KeyedRecordStore>,
    audit: Arc<dyn AuditSink>,
}

impl IdempotencyCoordinator {
    pub fn new(store: Arc<dyn KeyedRecordStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Decides NEW / IN_PROGRESS / REPLAY / CONFLICT for a key and payload.
    ///
    /// The atomic create runs first; the record is only read back when the
    /// create loses. A read-check-then-write sequence would admit a window
    /// where two first-arrivals both observe "absent" and both get NEW.
    pub async fn check_or_create(
        &self,
        key: &str,
        payload: &serde_json::Value,
        ttl_seconds: i64,
    ) -> Result<CheckOutcome> {
        let fingerprint = fingerprint_value(payload);

        // A failed create followed by an empty read means the existing
        // record expired in between; one more attempt settles it.
        for _ in 0..2 {
            let record = IdempotencyRecord::new(key.to_string(), fingerprint.clone(), ttl_seconds);
            if self.store.set(&record).await? {
                self.audit
                    .record("RECEIVED", json!({ "key": key, "payload": payload }));
                record_check_outcome("new");
                return Ok(CheckOutcome::New);
            }

            let Some(existing) = self.store.get(key).await? else {
                continue;
            };

            if existing.fingerprint != fingerprint {
                let event = if existing.is_completed() {
                    "CONFLICT"
                } else {
                    "CONFLICT_IN_PROGRESS"
                };
                self.audit
                    .record(event, json!({ "key": key, "payload": payload }));
                record_check_outcome("conflict");
                return Ok(CheckOutcome::Conflict);
            }

            if existing.is_completed() {
                let response = existing.response.ok_or_else(|| {
                    AppError::Internal(anyhow!("completed record for key {key} has no response"))
                })?;
                self.audit
                    .record("REPLAYED", json!({ "key": key, "payload": payload }));
                record_check_outcome("replay");
                return Ok(CheckOutcome::Replay(response));
            }

            self.audit
                .record("PROCESSING_STARTED", json!({ "key": key, "payload": payload }));
            record_check_outcome("in_progress");
            return Ok(CheckOutcome::InProgress);
        }

        Err(AppError::Internal(anyhow!(
            "record for key {key} kept expiring while being created"
        )))
    }

    /// Transitions IN_PROGRESS to COMPLETED and stores the response.
    /// Idempotent: completing an absent or already-completed key is a no-op,
    /// so a completed record's response is never overwritten.
    pub async fn complete(&self, key: &str, response: serde_json::Value) -> Result<()> {
        match self.store.get(key).await? {
            None => Ok(()),
            Some(record) if record.is_completed() => Ok(()),
            Some(_) => {
                self.store
                    .update(key, RecordUpdate::completed(response.clone()))
                    .await?;
                self.audit
                    .record("COMPLETED", json!({ "key": key, "response": response }));
                Ok(())
            }
        }
    }
}
