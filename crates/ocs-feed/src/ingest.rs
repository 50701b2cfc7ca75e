//! Ingest loop: transport events into the shared stores.

use crate::feed_store::FeedStore;
use crate::order_store::OrderStore;
use crate::parser::{FeedEvent, MessageParser};
use ocs_telemetry::Metrics;
use ocs_ws::{SubscriptionCommand, TransportEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Applies transport events to the feed and order stores.
///
/// On every session open it asks the subscription manager to re-issue the
/// recorded subscriptions, since a fresh session starts with none.
pub struct FeedIngestor {
    feed: Arc<FeedStore>,
    orders: Arc<OrderStore>,
    parser: MessageParser,
    resubscribe_tx: Option<mpsc::Sender<SubscriptionCommand>>,
}

impl FeedIngestor {
    pub fn new(feed: Arc<FeedStore>, orders: Arc<OrderStore>) -> Self {
        Self {
            feed,
            orders,
            parser: MessageParser::new(),
            resubscribe_tx: None,
        }
    }

    /// Send `SubscriptionCommand::Resubscribe` on every session open.
    pub fn with_resubscribe(mut self, tx: mpsc::Sender<SubscriptionCommand>) -> Self {
        self.resubscribe_tx = Some(tx);
        self
    }

    pub fn parser(&self) -> &MessageParser {
        &self.parser
    }

    /// Apply one event.
    pub async fn handle(&self, event: TransportEvent) {
        let event = match self.parser.parse(event) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Dropping transport event");
                return;
            }
        };

        match event {
            FeedEvent::Tick { key, feed, tick } => {
                self.feed.write(key, tick);
                Metrics::tick_ingested(feed.label());
            }
            FeedEvent::Order {
                order_no,
                status,
                trading_symbol,
                rejection_reason,
            } => {
                debug!(%order_no, %status, "Order update");
                self.orders
                    .write(&order_no, &status, trading_symbol, rejection_reason);
                Metrics::order_update();
            }
            FeedEvent::SessionOpened => {
                info!("Session opened, requesting resubscribe");
                if let Some(tx) = &self.resubscribe_tx {
                    if tx.send(SubscriptionCommand::Resubscribe).await.is_err() {
                        warn!("Subscription manager gone, resubscribe skipped");
                    }
                }
            }
            FeedEvent::SessionLost => {
                warn!("Session lost, waiting for reconnect");
            }
            FeedEvent::SessionError(reason) => {
                warn!(%reason, "Transport reported an error");
            }
        }
    }

    /// Consume events until the channel closes or `shutdown` is cancelled.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<TransportEvent>,
        shutdown: CancellationToken,
    ) {
        info!("Feed ingest started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Feed ingest shutting down");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            info!("Transport event channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            accepted = self.parser.stats().accepted(),
            rejected = self.parser.stats().rejected(),
            "Feed ingest stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocs_core::Tick;
    use ocs_ws::{FeedType, OrderMessage, TickMessage};

    fn tick(exchange: &str, token: &str, lp: &str) -> TransportEvent {
        TransportEvent::Tick {
            feed: FeedType::Touchline,
            message: TickMessage {
                exchange: exchange.to_string(),
                token: token.to_string(),
                tick: Tick {
                    last_price: Some(lp.to_string()),
                    ..Default::default()
                },
            },
        }
    }

    #[tokio::test]
    async fn test_ticks_and_orders_are_stored() {
        let feed = Arc::new(FeedStore::new());
        let orders = Arc::new(OrderStore::new());
        let ingestor = FeedIngestor::new(feed.clone(), orders.clone());

        ingestor.handle(tick("NSE", "26000", "24100")).await;
        ingestor
            .handle(TransportEvent::OrderUpdate(OrderMessage {
                norenordno: Some("42".to_string()),
                status: Some("REJECTED".to_string()),
                tsym: None,
                reporttype: Some("Rejected".to_string()),
                rejreason: Some("margin".to_string()),
            }))
            .await;

        let key = "NSE|26000".parse().unwrap();
        assert_eq!(feed.read(&key).unwrap().last_price.as_deref(), Some("24100"));
        let order = orders.read("42").unwrap();
        assert_eq!(order.status, "REJECTED");
        assert_eq!(order.rejection_reason.as_deref(), Some("margin"));
    }

    #[tokio::test]
    async fn test_session_open_requests_resubscribe() {
        let (tx, mut rx) = mpsc::channel(4);
        let ingestor = FeedIngestor::new(Arc::new(FeedStore::new()), Arc::new(OrderStore::new()))
            .with_resubscribe(tx);

        ingestor.handle(TransportEvent::Connected).await;
        ingestor.handle(TransportEvent::Disconnected).await;

        assert_eq!(rx.recv().await, Some(SubscriptionCommand::Resubscribe));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let feed = Arc::new(FeedStore::new());
        let ingestor = FeedIngestor::new(feed.clone(), Arc::new(OrderStore::new()));
        let (tx, rx) = mpsc::channel(4);

        tx.send(tick("NFO", "1", "5")).await.unwrap();
        tx.send(tick("NFO", "", "5")).await.unwrap();
        drop(tx);

        ingestor.run(rx, CancellationToken::new()).await;
        assert_eq!(feed.len(), 1);
    }
}
