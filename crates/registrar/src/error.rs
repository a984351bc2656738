use crate::config::ConfigError;
use crate::telemetry::TelemetryError;

/// Top-level failures surfaced by the API binary during startup and serving.
/// Request-scoped failures are mapped to responses inside the router instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
}
