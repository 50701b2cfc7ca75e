//! Error types for ocs-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid instrument key: {0}")]
    InvalidInstrumentKey(String),

    #[error("Unknown exchange code: {0}")]
    UnknownExchange(String),

    #[error("Unknown option type: {0}")]
    UnknownOptionType(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
