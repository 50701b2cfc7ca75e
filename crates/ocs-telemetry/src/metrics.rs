//! Prometheus metrics for the option-chain streamer.
//!
//! Covers:
//! - Transport connection state and reconnects
//! - Tick and order-update ingest
//! - Subscription batches and subscribed-set size
//! - Strike-window rebuilds and resolver failures
//! - Feed liveness warnings
//! - Projected row counts
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter,
    register_int_gauge, CounterVec, Gauge, GaugeVec, IntCounter, IntGauge,
};

/// Transport connection state (1 = connected and authenticated).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "ocs_ws_connected",
        "Transport connection state (1=connected and authenticated)"
    )
    .unwrap()
});

/// Total reconnection attempts.
/// Labels: reason (closed/error/heartbeat/rejected)
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ocs_ws_reconnect_total",
        "Total transport reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Inbound frames that could not be decoded.
pub static WS_DECODE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ocs_ws_decode_errors_total",
        "Inbound transport frames that failed to decode"
    )
    .unwrap()
});

/// Ticks merged into the feed store.
/// Labels: kind (touchline/depth)
pub static TICKS_INGESTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ocs_ticks_ingested_total",
        "Tick updates merged into the feed store",
        &["kind"]
    )
    .unwrap()
});

/// Order status updates recorded.
pub static ORDER_UPDATES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ocs_order_updates_total",
        "Order status updates recorded"
    )
    .unwrap()
});

/// Subscribe batches issued to the transport.
/// Labels: mode (incremental/forced), outcome (ok/failed)
pub static SUBSCRIBE_BATCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ocs_subscribe_batches_total",
        "Subscribe batches issued to the transport",
        &["mode", "outcome"]
    )
    .unwrap()
});

/// Number of instruments in the subscribed set.
pub static SUBSCRIBED_INSTRUMENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "ocs_subscribed_instruments",
        "Instruments currently recorded as subscribed"
    )
    .unwrap()
});

/// Strike-window rebuilds.
/// Labels: symbol
pub static WINDOW_REBUILDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ocs_window_rebuilds_total",
        "Strike-window rebuilds per index",
        &["symbol"]
    )
    .unwrap()
});

/// Current ATM strike per index.
/// Labels: symbol
pub static ATM_STRIKE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("ocs_atm_strike", "Current ATM strike per index", &["symbol"]).unwrap()
});

/// Option legs that could not be resolved to a token.
/// Labels: symbol
pub static RESOLVE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ocs_resolve_failures_total",
        "Option legs that failed token resolution",
        &["symbol"]
    )
    .unwrap()
});

/// Liveness warnings raised.
/// Labels: kind (frozen/no_data)
pub static LIVENESS_WARNINGS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ocs_liveness_warnings_total",
        "Feed liveness warnings raised",
        &["kind"]
    )
    .unwrap()
});

/// Rows produced by the last projection.
/// Labels: table (index/chain:<symbol>)
pub static PROJECTED_ROWS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "ocs_projected_rows",
        "Rows produced by the last projection",
        &["table"]
    )
    .unwrap()
});

/// Metrics helper for recording values.
pub struct Metrics;

impl Metrics {
    /// Record transport connected and authenticated.
    pub fn ws_connected() {
        WS_CONNECTED.set(1.0);
    }

    /// Record transport disconnected.
    pub fn ws_disconnected() {
        WS_CONNECTED.set(0.0);
    }

    /// Record a reconnection attempt.
    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn ws_decode_error() {
        WS_DECODE_ERRORS_TOTAL.inc();
    }

    /// Record a merged tick.
    pub fn tick_ingested(kind: &str) {
        TICKS_INGESTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn order_update() {
        ORDER_UPDATES_TOTAL.inc();
    }

    /// Record a subscribe batch outcome.
    pub fn subscribe_batch(forced: bool, ok: bool) {
        let mode = if forced { "forced" } else { "incremental" };
        let outcome = if ok { "ok" } else { "failed" };
        SUBSCRIBE_BATCHES_TOTAL
            .with_label_values(&[mode, outcome])
            .inc();
    }

    pub fn subscribed_instruments(count: usize) {
        SUBSCRIBED_INSTRUMENTS.set(count as i64);
    }

    /// Record a strike-window rebuild and the new ATM.
    pub fn window_rebuilt(symbol: &str, atm: f64) {
        WINDOW_REBUILDS_TOTAL.with_label_values(&[symbol]).inc();
        ATM_STRIKE.with_label_values(&[symbol]).set(atm);
    }

    pub fn resolve_failure(symbol: &str) {
        RESOLVE_FAILURES_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn liveness_warning(kind: &str) {
        LIVENESS_WARNINGS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn projected_rows(table: &str, count: usize) {
        PROJECTED_ROWS
            .with_label_values(&[table])
            .set(count as f64);
    }
}
