//! Chain error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Symbol parameters needed before tracking can start.
    #[error("Registry error: {0}")]
    Registry(#[from] ocs_registry::RegistryError),

    #[error("Invalid instrument: {0}")]
    InvalidInstrument(#[from] ocs_core::CoreError),
}

pub type ChainResult<T> = Result<T, ChainError>;
