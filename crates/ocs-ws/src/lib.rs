//! Streaming transport client for the option-chain streamer.
//!
//! Provides:
//! - Session lifecycle with authentication, fixed-delay reconnect and heartbeat
//! - Outbound request queue that survives reconnects
//! - Wire message types for the broker's JSON protocol
//! - Subscription management: subscribed-set tracking, diffing and batching

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod subscription;
pub mod transport;
pub mod ws_write_handle;

pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, SessionCredentials, TransportEvent,
};
pub use error::{WsError, WsResult};
pub use message::{ConnectAck, FeedType, OrderMessage, TickMessage, WsMessage, WsRequest};
pub use subscription::{
    InstrumentSet, SubscriptionCommand, SubscriptionConfig, SubscriptionManager,
    DEFAULT_MAX_BATCH_SIZE,
};
pub use transport::{BoxFuture, DynFeedTransport, FeedTransport, MockFeedTransport};
pub use ws_write_handle::WsWriteHandle;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
