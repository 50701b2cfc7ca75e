//! Option-chain streamer application.
//!
//! Composes the streaming session, feed stores, subscription manager,
//! per-index strike-window trackers, projectors and feed liveness monitor
//! into one process.

pub mod app;
pub mod config;
pub mod display;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
