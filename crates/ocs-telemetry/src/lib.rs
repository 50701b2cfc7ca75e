//! Prometheus metrics and structured logging for the option-chain streamer.
//!
//! - Prometheus metrics for transport health, ingest, subscriptions,
//!   window rebuilds and feed liveness
//! - Structured logging with tracing (JSON in production)
//! - Optional `/metrics` scrape endpoint

pub mod error;
pub mod exporter;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use exporter::{render_metrics, serve_metrics};
pub use logging::init_logging;
pub use metrics::Metrics;
