use idempotency_gateway::api::routes::{create_router, AppState};
use idempotency_gateway::audit::{AuditSink, MemoryAuditLog};
use idempotency_gateway::config::{Settings, StoreBackend};
use idempotency_gateway::idempotency::{
    GateConfig, KeyedRecordStore, MemoryStore, RedisConnectOptions, RedisRecordStore, RequestGate,
};
use idempotency_gateway::observability::{init_logging, init_metrics, LogConfig, LogFormat};
use idempotency_gateway::payment::PaymentService;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    init_logging(&LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(settings.application.log_format.as_str()),
        ..LogConfig::default()
    });
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    // The store backend is chosen exactly once here and injected everywhere.
    let store: Arc<dyn KeyedRecordStore> = match settings.idempotency.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(Duration::from_secs(
            settings.idempotency.sweep_interval_seconds,
        ))),
        StoreBackend::Redis => {
            info!("Connecting to Redis at {}...", settings.redis.url);
            Arc::new(
                RedisRecordStore::connect(
                    &settings.redis.url,
                    "idem",
                    RedisConnectOptions {
                        max_retries: settings.redis.connect_max_retries,
                        base_delay: Duration::from_millis(settings.redis.connect_base_delay_ms),
                        max_delay: Duration::from_millis(settings.redis.connect_max_delay_ms),
                    },
                )
                .await,
            )
        }
    };
    info!(backend = store.backend_name(), "Record store initialized");

    let audit = Arc::new(MemoryAuditLog::new());
    let gate = Arc::new(RequestGate::new(
        Arc::clone(&store),
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        GateConfig {
            ttl_seconds: settings.idempotency.ttl_seconds,
            poll_interval: Duration::from_millis(settings.idempotency.poll_interval_ms),
            max_poll_attempts: settings.idempotency.max_poll_attempts,
        },
    ));
    let payments = Arc::new(PaymentService::new(Duration::from_millis(
        settings.payment.processing_delay_ms,
    )));

    let state = AppState::new(store, gate, audit, payments).with_metrics(metrics_handle);
    let app = create_router(state);

    let addr = format!(
        "{}:{}",
        settings.application.host, settings.application.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
