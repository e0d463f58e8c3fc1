use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// A single recorded audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub details: serde_json::Value,
}

/// Receiver of structured audit events emitted by the idempotency layer.
/// External collaborator boundary; implementations decide persistence.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &str, details: serde_json::Value);
}

/// In-process append-only audit log. Entries are kept in insertion order
/// and served verbatim by the admin endpoint.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, event: &str, details: serde_json::Value) {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event: event.to_string(),
            details,
        };
        tracing::info!(event = %entry.event, details = %entry.details, "audit");
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}
