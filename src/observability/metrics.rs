use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Installs the Prometheus recorder and registers metric descriptions.
/// Called once at startup; the returned handle renders `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "idempotency_checks_total",
        "Idempotency check outcomes by decision"
    );
    describe_histogram!(
        "idempotency_wait_duration_ms",
        Unit::Milliseconds,
        "Time spent waiting on an in-flight duplicate"
    );
    describe_counter!(
        "payments_processed_total",
        "Payment operations executed (not replayed)"
    );

    Ok(handle)
}

pub fn record_check_outcome(outcome: &'static str) {
    counter!("idempotency_checks_total", "outcome" => outcome).increment(1);
}

pub fn record_wait_duration(duration_ms: f64, resolved: bool) {
    histogram!("idempotency_wait_duration_ms", "resolved" => resolved.to_string())
        .record(duration_ms);
}

pub fn record_payment_processed(currency: &str) {
    counter!("payments_processed_total", "currency" => currency.to_string()).increment(1);
}
