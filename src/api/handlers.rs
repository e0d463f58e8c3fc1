use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use crate::api::requests::ProcessPaymentRequest;
use crate::api::responses::{ErrorBody, HealthResponse, PaymentResponse, StoreHealth};
use crate::audit::AuditEntry;
use crate::error::AppError;
use crate::idempotency::{Admission, KeyedRecordStore};

use super::routes::AppState;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
const CACHE_HIT_HEADER: &str = "x-cache-hit";

/// Protected endpoint: deduplicates retried charges by idempotency key.
pub async fn process_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProcessPaymentRequest>,
) -> Response {
    // The key check comes first: a keyless request is rejected the same
    // way whether or not its body would validate.
    let key = match state.gate.require_key(
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|value| value.to_str().ok()),
    ) {
        Ok(key) => key,
        Err(e) => return reject(e),
    };

    if let Err(errors) = request.validate() {
        let message = errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message))).into_response();
    }

    let payload = match serde_json::to_value(&request) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize request payload");
            return internal_error();
        }
    };

    match state.gate.admit(Some(key), &payload).await {
        Ok(Admission::Execute) => {
            let receipt = state.payments.charge(request.amount, &request.currency).await;
            let response = PaymentResponse::from(receipt);
            let response_value = match serde_json::to_value(&response) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize payment receipt");
                    return internal_error();
                }
            };

            // The operation already executed; a completion failure must
            // not turn its success into a caller-visible error.
            if let Err(e) = state.gate.complete(key, response_value).await {
                tracing::error!(error = %e, "failed to record completion");
            }

            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Admission::Replay(response)) => {
            ([(CACHE_HIT_HEADER, "true")], Json(response)).into_response()
        }
        Err(e) => reject(e),
    }
}

/// Returns recorded audit events in insertion order.
pub async fn get_audit(State(state): State<AppState>) -> Json<Vec<AuditEntry>> {
    Json(state.audit.entries())
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let reachable = state.store.get("health-probe").await.is_ok();

    Json(HealthResponse {
        status: if reachable { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        store: StoreHealth {
            backend: state.store.backend_name().to_string(),
            reachable,
        },
    })
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus exposition endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn reject(error: AppError) -> Response {
    match error {
        AppError::Validation(_) => {
            (StatusCode::CONFLICT, Json(ErrorBody::new("key missing"))).into_response()
        }
        AppError::Conflict(_) => (
            StatusCode::CONFLICT,
            Json(ErrorBody::new("key reused for different body")),
        )
            .into_response(),
        AppError::Timeout(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody::new("still in progress")),
        )
            .into_response(),
        AppError::StoreUnavailable(msg) => {
            tracing::error!(error = %msg, "idempotency store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody::new("idempotency store unavailable")),
            )
                .into_response()
        }
        e => {
            tracing::error!(error = %e, "request failed");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new("internal error")),
    )
        .into_response()
}
