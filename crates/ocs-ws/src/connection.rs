//! Streaming session manager.
//!
//! Owns the WebSocket to the broker: opens it, authenticates with the
//! session-open request, forwards decoded frames as [`TransportEvent`]s,
//! keeps the heartbeat going and reconnects after a fixed delay whenever the
//! session drops. Outbound requests queued through [`WsWriteHandle`] are only
//! flushed once the broker has acknowledged the session.

use crate::error::{WsError, WsResult};
use crate::heartbeat::{HeartbeatManager, HEARTBEAT_PAYLOAD};
use crate::message::{FeedType, OrderMessage, TickMessage, WsMessage, WsRequest};
use crate::ws_write_handle::WsWriteHandle;
use futures_util::{SinkExt, StreamExt};
use ocs_telemetry::Metrics;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Credentials for the session-open request.
#[derive(Clone, Default)]
pub struct SessionCredentials {
    pub user_id: String,
    pub account_id: String,
    pub session_token: String,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("user_id", &self.user_id)
            .field("account_id", &self.account_id)
            .field("session_token", &"<redacted>")
            .finish()
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    pub credentials: SessionCredentials,
    /// Feed flavour used for instrument subscriptions.
    pub feed_type: FeedType,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay_ms: u64,
    /// Heartbeat ping interval.
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout (pong must arrive within this).
    pub heartbeat_timeout_ms: u64,
    /// Capacity of the outbound request queue.
    pub outbound_capacity: usize,
    /// Account whose order updates are subscribed on every session open.
    pub order_account: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: SessionCredentials::default(),
            feed_type: FeedType::Depth,
            max_reconnect_attempts: 0, // Infinite
            reconnect_delay_ms: 100,
            heartbeat_interval_ms: 3000,
            heartbeat_timeout_ms: 10000,
            outbound_capacity: 1024,
            order_account: None,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open, waiting for the session-open acknowledgement.
    Authenticating,
    Connected,
    Reconnecting,
}

/// Event delivered to the ingest side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Session acknowledged; subscriptions must be re-issued.
    Connected,
    /// Session lost; a reconnect is pending.
    Disconnected,
    Tick {
        feed: FeedType,
        message: TickMessage,
    },
    OrderUpdate(OrderMessage),
    /// Broker-reported error (e.g. rejected session).
    Error(String),
}

/// Streaming session manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: Arc<HeartbeatManager>,
    event_tx: mpsc::Sender<TransportEvent>,
    reconnect_count: Arc<RwLock<u32>>,
    /// Outbound request sender (cloned into write handles).
    outbound_tx: mpsc::Sender<WsRequest>,
    /// Outbound request receiver (consumed by the message loop).
    outbound_rx: Arc<TokioMutex<mpsc::Receiver<WsRequest>>>,
    /// Stops the session loop and reconnects.
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, event_tx: mpsc::Sender<TransportEvent>) -> Self {
        Self::with_shutdown(config, event_tx, CancellationToken::new())
    }

    /// Create a manager whose lifetime is bound to an external token.
    pub fn with_shutdown(
        config: ConnectionConfig,
        event_tx: mpsc::Sender<TransportEvent>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        Self {
            heartbeat: Arc::new(HeartbeatManager::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            )),
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_tx,
            reconnect_count: Arc::new(RwLock::new(0)),
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            shutdown_token,
        }
    }

    /// Get a write handle for queueing requests.
    ///
    /// The handle can be cloned and shared across tasks; requests survive
    /// reconnects because they sit in the outbound queue until flushed.
    pub fn write_handle(&self) -> WsWriteHandle {
        WsWriteHandle::new(
            self.outbound_tx.clone(),
            self.state.clone(),
            self.config.feed_type,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive failed attempts since the last acknowledged session.
    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    /// Stop the session and suppress further reconnects.
    pub fn shutdown(&self) {
        info!("Streaming session shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run the session loop until shutdown.
    pub async fn connect(&self) -> WsResult<()> {
        self.connect_with_retry().await
    }

    async fn connect_with_retry(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                info!("Stopping before next session attempt");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            let reason = match self.try_connect().await {
                Ok(()) => {
                    info!("Streaming session ended");
                    "ended"
                }
                Err(e) => {
                    error!(error = %e, "Streaming session error");
                    reconnect_reason(&e)
                }
            };

            let was_connected = self.state() == ConnectionState::Connected;
            if was_connected {
                attempt = 0;
                Metrics::ws_disconnected();
                self.emit(TransportEvent::Disconnected).await;
            }

            if self.is_shutdown() {
                info!("Session closed during shutdown");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Giving up on streaming session");
                self.set_state(ConnectionState::Disconnected);
                return Err(WsError::ConnectionFailed(format!(
                    "gave up after {attempt} attempts"
                )));
            }

            self.set_state(ConnectionState::Reconnecting);
            Metrics::ws_reconnect(reason);

            let delay = Duration::from_millis(self.config.reconnect_delay_ms);
            warn!(attempt, delay_ms = delay.as_millis() as u64, reason, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during reconnect delay, exiting");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to streaming endpoint");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Authenticating);
        self.heartbeat.reset();

        let creds = &self.config.credentials;
        let open = WsRequest::connect(&creds.user_id, &creds.account_id, &creds.session_token);
        write.send(Message::Text(open.to_json()?)).await?;
        debug!(user = %creds.user_id, "Session-open request sent");

        let mut authenticated = false;
        let mut hb_ticker = tokio::time::interval(self.heartbeat.check_interval());
        hb_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let outbound_recv = async { self.outbound_rx.lock().await.recv().await };

            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Closing streaming session");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let was_authenticated = authenticated;
                            self.handle_text_message(&text, &mut authenticated).await?;
                            if authenticated && !was_authenticated {
                                if let Some(account) = &self.config.order_account {
                                    let request = WsRequest::subscribe_orders(account);
                                    write.send(Message::Text(request.to_json()?)).await?;
                                    debug!(%account, "Order updates subscribed");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Connection closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Feed socket ended without close frame");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_recv, if authenticated => {
                    if let Some(request) = outbound {
                        let text = request.to_json()?;
                        write.send(Message::Text(text)).await?;
                        debug!(kind = request.kind(), "Request sent");
                    }
                }

                _ = hb_ticker.tick() => {
                    if self.heartbeat.is_timed_out() {
                        error!(
                            timeout_ms = self.config.heartbeat_timeout_ms,
                            "No pong from broker, dropping session"
                        );
                        return Err(WsError::HeartbeatTimeout);
                    }

                    if self.heartbeat.should_send_heartbeat() {
                        write.send(Message::Ping(HEARTBEAT_PAYLOAD.to_vec())).await?;
                        self.heartbeat.record_ping();
                        debug!("Heartbeat ping sent");
                    }
                }
            }
        }
    }

    async fn handle_text_message(&self, text: &str, authenticated: &mut bool) -> WsResult<()> {
        let msg = match WsMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                Metrics::ws_decode_error();
                warn!(error = %e, frame = %text, "Dropping undecodable frame");
                return Ok(());
            }
        };

        match msg {
            WsMessage::ConnectAck(ack) if ack.is_ok() => {
                *authenticated = true;
                self.set_state(ConnectionState::Connected);
                *self.reconnect_count.write() = 0;
                Metrics::ws_connected();
                info!(uid = ?ack.uid, "Streaming session acknowledged");
                self.emit(TransportEvent::Connected).await;
            }
            WsMessage::ConnectAck(ack) => {
                let reason = ack.reason();
                error!(%reason, "Streaming session rejected");
                self.emit(TransportEvent::Error(reason.clone())).await;
                return Err(WsError::SessionRejected(reason));
            }
            WsMessage::Touchline(message) => {
                self.emit(TransportEvent::Tick {
                    feed: FeedType::Touchline,
                    message,
                })
                .await;
            }
            WsMessage::Depth(message) => {
                self.emit(TransportEvent::Tick {
                    feed: FeedType::Depth,
                    message,
                })
                .await;
            }
            WsMessage::Order(order) => {
                self.emit(TransportEvent::OrderUpdate(order)).await;
            }
            WsMessage::Other => {
                debug!(frame = %text, "Ignoring frame");
            }
        }

        Ok(())
    }

    async fn emit(&self, event: TransportEvent) {
        if self.event_tx.send(event).await.is_err() {
            warn!("Transport event receiver dropped");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }
}

fn reconnect_reason(error: &WsError) -> &'static str {
    match error {
        WsError::ConnectionClosed { .. } => "closed",
        WsError::HeartbeatTimeout => "heartbeat",
        WsError::SessionRejected(_) => "rejected",
        _ => "error",
    }
}
