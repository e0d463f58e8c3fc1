use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Successful charge response, also returned verbatim on replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub message: String,
}

impl From<crate::payment::PaymentReceipt> for PaymentResponse {
    fn from(receipt: crate::payment::PaymentReceipt) -> Self {
        Self {
            message: receipt.message,
        }
    }
}

/// Error body for caller-visible rejections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub store: StoreHealth,
}

/// Record store health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHealth {
    pub backend: String,
    pub reachable: bool,
}
