use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::audit::MemoryAuditLog;
use crate::idempotency::{KeyedRecordStore, RequestGate};
use crate::payment::PaymentService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyedRecordStore>,
    pub gate: Arc<RequestGate>,
    pub audit: Arc<MemoryAuditLog>,
    pub payments: Arc<PaymentService>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn KeyedRecordStore>,
        gate: Arc<RequestGate>,
        audit: Arc<MemoryAuditLog>,
        payments: Arc<PaymentService>,
    ) -> Self {
        Self {
            store,
            gate,
            audit,
            payments,
            metrics_handle: None,
        }
    }

    /// Adds the Prometheus handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/process-payment", post(handlers::process_payment))
        .route("/admin/audit", get(handlers::get_audit))
        .route("/health", get(handlers::health_check))
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
