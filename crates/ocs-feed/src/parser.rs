//! Transport event parsing.
//!
//! Turns raw transport events into typed feed events, validating instrument
//! keys and dropping updates that carry nothing usable.

use crate::error::{FeedError, FeedResult};
use ocs_core::{InstrumentKey, Tick};
use ocs_ws::{FeedType, OrderMessage, TickMessage, TransportEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Parsed feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Tick {
        key: InstrumentKey,
        feed: FeedType,
        tick: Tick,
    },
    Order {
        order_no: String,
        status: String,
        trading_symbol: Option<String>,
        rejection_reason: Option<String>,
    },
    SessionOpened,
    SessionLost,
    SessionError(String),
}

/// Parser statistics.
#[derive(Debug, Default)]
pub struct ParseStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl ParseStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Transport event parser.
#[derive(Debug, Default)]
pub struct MessageParser {
    stats: ParseStats,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse one transport event.
    ///
    /// Returns `Ok(None)` for events that are valid but carry no update
    /// (e.g. a tick frame with no known field).
    pub fn parse(&self, event: TransportEvent) -> FeedResult<Option<FeedEvent>> {
        let result = match event {
            TransportEvent::Tick { feed, message } => self.parse_tick(feed, message),
            TransportEvent::OrderUpdate(order) => self.parse_order(order),
            TransportEvent::Connected => Ok(Some(FeedEvent::SessionOpened)),
            TransportEvent::Disconnected => Ok(Some(FeedEvent::SessionLost)),
            TransportEvent::Error(reason) => Ok(Some(FeedEvent::SessionError(reason))),
        };

        match &result {
            Ok(_) => self.stats.accepted.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.rejected.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    fn parse_tick(&self, feed: FeedType, message: TickMessage) -> FeedResult<Option<FeedEvent>> {
        let key = message.instrument_key()?;
        if message.tick.is_empty() {
            debug!(%key, "Tick without known fields");
            return Ok(None);
        }
        Ok(Some(FeedEvent::Tick {
            key,
            feed,
            tick: message.tick,
        }))
    }

    fn parse_order(&self, order: OrderMessage) -> FeedResult<Option<FeedEvent>> {
        match (order.norenordno, order.status) {
            (Some(order_no), Some(status)) => Ok(Some(FeedEvent::Order {
                order_no,
                status,
                trading_symbol: order.tsym,
                rejection_reason: order.rejreason,
            })),
            (order_no, _) => Err(FeedError::IncompleteOrder(
                order_no.unwrap_or_else(|| "<no order number>".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_event(exchange: &str, token: &str, tick: Tick) -> TransportEvent {
        TransportEvent::Tick {
            feed: FeedType::Depth,
            message: TickMessage {
                exchange: exchange.to_string(),
                token: token.to_string(),
                tick,
            },
        }
    }

    #[test]
    fn test_parse_tick() {
        let parser = MessageParser::new();
        let tick = Tick {
            last_price: Some("10".to_string()),
            ..Default::default()
        };

        let event = parser.parse(tick_event("NFO", "43512", tick.clone())).unwrap();

        assert_eq!(
            event,
            Some(FeedEvent::Tick {
                key: "NFO|43512".parse().unwrap(),
                feed: FeedType::Depth,
                tick,
            })
        );
        assert_eq!(parser.stats().accepted(), 1);
    }

    #[test]
    fn test_parse_tick_rejects_bad_key() {
        let parser = MessageParser::new();
        let tick = Tick {
            last_price: Some("10".to_string()),
            ..Default::default()
        };

        assert!(parser.parse(tick_event("NFO", "", tick)).is_err());
        assert_eq!(parser.stats().rejected(), 1);
    }

    #[test]
    fn test_parse_empty_tick_is_skipped() {
        let parser = MessageParser::new();
        assert_eq!(parser.parse(tick_event("NSE", "26000", Tick::default())).unwrap(), None);
    }

    #[test]
    fn test_parse_order_requires_number_and_status() {
        let parser = MessageParser::new();
        let complete = OrderMessage {
            norenordno: Some("1".to_string()),
            status: Some("OPEN".to_string()),
            tsym: None,
            reporttype: None,
            rejreason: None,
        };
        let missing_status = OrderMessage {
            status: None,
            ..complete.clone()
        };

        assert!(matches!(
            parser.parse(TransportEvent::OrderUpdate(complete)).unwrap(),
            Some(FeedEvent::Order { .. })
        ));
        assert!(parser.parse(TransportEvent::OrderUpdate(missing_status)).is_err());
    }
}
