//! Write handle for queueing outbound requests.
//!
//! Requests are queued on the connection's outbound channel and flushed by
//! the connection loop once the session is authenticated. While disconnected
//! they stay queued, so callers never need to wait for a reconnect.

use crate::connection::ConnectionState;
use crate::error::{WsError, WsResult};
use crate::message::{FeedType, WsRequest};
use crate::transport::{BoxFuture, FeedTransport};
use ocs_core::InstrumentKey;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Cloneable handle for sending requests through a `ConnectionManager`.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<WsRequest>,
    state: Arc<RwLock<ConnectionState>>,
    feed_type: FeedType,
}

impl WsWriteHandle {
    pub fn new(
        tx: mpsc::Sender<WsRequest>,
        state: Arc<RwLock<ConnectionState>>,
        feed_type: FeedType,
    ) -> Self {
        Self {
            tx,
            state,
            feed_type,
        }
    }

    /// Queue a request.
    ///
    /// Waits only while the outbound queue is full.
    ///
    /// # Errors
    ///
    /// `WsError::ChannelClosed` once the connection manager has gone away.
    pub async fn send(&self, request: WsRequest) -> WsResult<()> {
        let kind = request.kind();
        self.tx
            .send(request)
            .await
            .map_err(|_| WsError::ChannelClosed)?;
        debug!(kind, connected = self.is_connected(), "Request queued");
        Ok(())
    }

    /// Queue a subscribe request for `keys` on the configured feed.
    pub async fn subscribe_keys(&self, keys: &[InstrumentKey]) -> WsResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.send(WsRequest::subscribe(self.feed_type, keys)).await
    }

    /// True when the session is open and authenticated.
    pub fn is_connected(&self) -> bool {
        *self.state.read() == ConnectionState::Connected && !self.tx.is_closed()
    }
}

impl FeedTransport for WsWriteHandle {
    fn subscribe<'a>(&'a self, keys: &'a [InstrumentKey]) -> BoxFuture<'a, WsResult<()>> {
        Box::pin(self.subscribe_keys(keys))
    }
}
