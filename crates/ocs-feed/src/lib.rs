//! Market data feed aggregation for the option-chain streamer.
//!
//! Ingests transport events into a shared latest-tick store (and order
//! status store), and watches a reference instrument for feed staleness.

pub mod error;
pub mod feed_store;
pub mod ingest;
pub mod liveness;
pub mod order_store;
pub mod parser;

pub use error::{FeedError, FeedResult};
pub use feed_store::{FeedSnapshot, FeedStore};
pub use ingest::FeedIngestor;
pub use liveness::{FeedLivenessMonitor, LivenessConfig, LivenessWarning};
pub use order_store::{OrderStatus, OrderStore};
pub use parser::{FeedEvent, MessageParser, ParseStats};
