//! Subscription transport seam.
//!
//! The subscription manager only needs "subscribe these keys"; this trait keeps
//! it independent of the WebSocket session so it can be driven by a mock in
//! tests or by another transport backend.

use crate::error::{WsError, WsResult};
use ocs_core::InstrumentKey;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Transport capable of subscribing instruments.
pub trait FeedTransport: Send + Sync {
    /// Request market data for `keys` in a single call.
    ///
    /// Completion means the request was accepted for delivery; while the
    /// session is down it may be queued until the next authenticated session.
    fn subscribe<'a>(&'a self, keys: &'a [InstrumentKey]) -> BoxFuture<'a, WsResult<()>>;
}

/// Arc wrapper for FeedTransport trait objects.
pub type DynFeedTransport = Arc<dyn FeedTransport>;

/// Mock transport for testing.
///
/// Records every subscribe call; failures can be scripted per call.
#[derive(Debug, Default)]
pub struct MockFeedTransport {
    calls: Mutex<Vec<Vec<InstrumentKey>>>,
    /// Scripted outcomes, consumed front to back. `true` = fail that call.
    script: Mutex<VecDeque<bool>>,
}

impl MockFeedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of upcoming calls (`true` = fail).
    pub fn script_failures(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.script.lock().extend(outcomes);
    }

    /// Recorded subscribe calls, one entry per batch.
    pub fn calls(&self) -> Vec<Vec<InstrumentKey>> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl FeedTransport for MockFeedTransport {
    fn subscribe<'a>(&'a self, keys: &'a [InstrumentKey]) -> BoxFuture<'a, WsResult<()>> {
        Box::pin(async move {
            self.calls.lock().push(keys.to_vec());
            if self.script.lock().pop_front().unwrap_or(false) {
                return Err(WsError::SendFailed("scripted failure".to_string()));
            }
            Ok(())
        })
    }
}
