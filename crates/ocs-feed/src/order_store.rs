//! Latest order status per order number.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Last reported status of one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatus {
    pub status: String,
    /// Trading symbol, when the update carried one.
    pub trading_symbol: Option<String>,
    pub rejection_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Concurrent order number → status mapping.
///
/// Each update replaces the stored status for its order; a later update
/// without a trading symbol keeps the one already known.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: DashMap<String, OrderStatus>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(
        &self,
        order_no: &str,
        status: &str,
        trading_symbol: Option<String>,
        rejection_reason: Option<String>,
    ) {
        let now = Utc::now();
        self.orders
            .entry(order_no.to_string())
            .and_modify(|entry| {
                entry.status = status.to_string();
                if trading_symbol.is_some() {
                    entry.trading_symbol = trading_symbol.clone();
                }
                entry.rejection_reason = rejection_reason.clone();
                entry.updated_at = now;
            })
            .or_insert_with(|| OrderStatus {
                status: status.to_string(),
                trading_symbol: trading_symbol.clone(),
                rejection_reason: rejection_reason.clone(),
                updated_at: now,
            });
    }

    pub fn read(&self, order_no: &str) -> Option<OrderStatus> {
        self.orders.get(order_no).map(|e| e.value().clone())
    }

    /// Copy of every tracked order.
    pub fn snapshot(&self) -> Vec<(String, OrderStatus)> {
        self.orders
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
