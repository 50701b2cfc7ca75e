//! Registry error types.

use chrono::NaiveDate;
use ocs_core::{OptionType, Price};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Contract not found: {symbol} {expiry} {strike} {option_type}")]
    ContractNotFound {
        symbol: String,
        strike: Price,
        option_type: OptionType,
        expiry: NaiveDate,
    },

    #[error("No upcoming expiry for {0}")]
    NoExpiry(String),

    #[error("Cannot derive strike spacing for {0}")]
    NoStrikeSpacing(String),

    #[error("Symbol master is stale: {0}")]
    Stale(String),

    #[error("Symbol master unavailable after {attempts} attempts: {last_error}")]
    LoadFailed { attempts: u32, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
