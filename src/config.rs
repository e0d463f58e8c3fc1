use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub idempotency: IdempotencySettings,
    pub redis: RedisSettings,
    pub payment: PaymentSettings,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

/// Which record store backend to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize)]
pub struct IdempotencySettings {
    /// Backend selected once at process start; never branched on per request.
    pub backend: StoreBackend,
    pub ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

#[derive(Debug, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    pub connect_max_retries: u32,
    pub connect_base_delay_ms: u64,
    pub connect_max_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentSettings {
    pub processing_delay_ms: u64,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
