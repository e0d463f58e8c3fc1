pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod observability;
pub mod payment;
