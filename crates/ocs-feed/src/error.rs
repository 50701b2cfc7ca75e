//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid instrument: {0}")]
    InvalidInstrument(#[from] ocs_core::CoreError),

    #[error("Incomplete order update: {0}")]
    IncompleteOrder(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
