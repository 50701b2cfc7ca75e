//! Option chain tracking for the streamer.
//!
//! One tracker per index keeps an ATM-centred strike window subscribed;
//! projectors turn feed store snapshots into index and chain display rows.

pub mod error;
pub mod projector;
pub mod tracker;
pub mod window;

pub use error::{ChainError, ChainResult};
pub use projector::{
    change, change_in_oi, project_chain, project_indices, ChainLeg, ChainProjector, ChainRow,
    IndexConfig, IndexProjector, IndexRow, CHAIN_HEADERS, INDEX_HEADERS,
};
pub use tracker::{ChainTrackerConfig, ChainWindowTracker, TrackerState};
pub use window::{
    atm_strike, strike_ladder, ChainWindow, HysteresisBand, StrikeLegs, StrikeWindow, TokenMap,
};
