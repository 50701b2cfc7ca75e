//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<ocs_ws::WsError>),

    #[error("Registry error: {0}")]
    Registry(#[from] ocs_registry::RegistryError),

    #[error("Chain error: {0}")]
    Chain(#[from] ocs_chain::ChainError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] ocs_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
