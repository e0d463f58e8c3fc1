#![allow(dead_code)]

use async_trait::async_trait;
use idempotency_gateway::audit::{AuditSink, MemoryAuditLog};
use idempotency_gateway::error::{AppError, Result};
use idempotency_gateway::idempotency::{
    GateConfig, IdempotencyCoordinator, IdempotencyRecord, KeyedRecordStore, MemoryStore,
    RecordUpdate, RequestGate,
};
use std::sync::Arc;
use std::time::Duration;

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(Duration::from_secs(30)))
}

pub fn coordinator(store: Arc<dyn KeyedRecordStore>) -> (IdempotencyCoordinator, Arc<MemoryAuditLog>) {
    let audit = Arc::new(MemoryAuditLog::new());
    let coordinator =
        IdempotencyCoordinator::new(store, Arc::clone(&audit) as Arc<dyn AuditSink>);
    (coordinator, audit)
}

pub fn gate(
    store: Arc<dyn KeyedRecordStore>,
    config: GateConfig,
) -> (Arc<RequestGate>, Arc<MemoryAuditLog>) {
    let audit = Arc::new(MemoryAuditLog::new());
    let gate = Arc::new(RequestGate::new(
        store,
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        config,
    ));
    (gate, audit)
}

pub fn fast_gate_config() -> GateConfig {
    GateConfig {
        ttl_seconds: 60,
        poll_interval: Duration::from_millis(20),
        max_poll_attempts: 50,
    }
}

/// Store whose backend is down. Every operation fails.
pub struct UnavailableStore;

#[async_trait]
impl KeyedRecordStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<IdempotencyRecord>> {
        Err(AppError::StoreUnavailable("backend down".to_string()))
    }

    async fn set(&self, _record: &IdempotencyRecord) -> Result<bool> {
        Err(AppError::StoreUnavailable("backend down".to_string()))
    }

    async fn update(&self, _key: &str, _update: RecordUpdate) -> Result<bool> {
        Err(AppError::StoreUnavailable("backend down".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(AppError::StoreUnavailable("backend down".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}
