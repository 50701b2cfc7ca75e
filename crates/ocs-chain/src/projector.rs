//! Display row projection.
//!
//! Projectors read a feed store snapshot on a fixed period and publish
//! freshly computed rows on watch channels. They never write to the store.
//! Fields the feed has not delivered, or delivered malformed, render as
//! empty cells; a derived value with an unknown input is unknown, not zero.

use crate::window::ChainWindow;
use ocs_core::{parse_numeric, InstrumentKey, Price, Tick};
use ocs_feed::{FeedSnapshot, FeedStore};
use ocs_telemetry::Metrics;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const INDEX_HEADERS: [&str; 8] = [
    "Index", "Open", "High", "Low", "Close", "LTP", "Change", "Total OI",
];

pub const CHAIN_HEADERS: [&str; 17] = [
    "Low", "High", "Open", "Volume", "COI", "OI", "Change", "LTP", "Strike", "LTP", "Change", "OI",
    "COI", "Volume", "Open", "High", "Low",
];

/// `ltp - prev_close` rounded to 2 dp, `None` when either side is unknown
/// or the difference is out of range.
pub fn change(ltp: Option<&str>, prev_close: Option<&str>) -> Option<Decimal> {
    let ltp = parse_numeric(ltp)?;
    let prev_close = parse_numeric(prev_close)?;
    Some(ltp.checked_sub(prev_close)?.round_dp(2))
}

/// Change in open interest: `oi - poi`, `None` when either side is unknown.
pub fn change_in_oi(oi: Option<&str>, prev_oi: Option<&str>) -> Option<Decimal> {
    parse_numeric(oi)?.checked_sub(parse_numeric(prev_oi)?)
}

fn cell(raw: &Option<String>) -> String {
    raw.clone().unwrap_or_default()
}

fn decimal_cell(value: Option<Decimal>) -> String {
    value.map(|d| d.normalize().to_string()).unwrap_or_default()
}

/// One index shown in the index table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub name: String,
    pub key: InstrumentKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRow {
    pub name: String,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub last_price: Option<String>,
    pub change: Option<Decimal>,
    pub total_open_interest: Option<String>,
}

impl IndexRow {
    pub fn from_tick(index: &IndexConfig, tick: &Tick) -> Self {
        let name = tick
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| index.name.clone());

        Self {
            name,
            open: tick.open.clone(),
            high: tick.high.clone(),
            low: tick.low.clone(),
            close: tick.prev_close.clone(),
            last_price: tick.last_price.clone(),
            change: change(tick.last_price.as_deref(), tick.prev_close.as_deref()),
            total_open_interest: tick.total_open_interest.clone(),
        }
    }

    /// Cells in `INDEX_HEADERS` order.
    pub fn to_cells(&self) -> [String; 8] {
        [
            self.name.clone(),
            cell(&self.open),
            cell(&self.high),
            cell(&self.low),
            cell(&self.close),
            cell(&self.last_price),
            decimal_cell(self.change),
            cell(&self.total_open_interest),
        ]
    }
}

/// One side (call or put) of a chain row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainLeg {
    pub low: Option<String>,
    pub high: Option<String>,
    pub open: Option<String>,
    pub volume: Option<String>,
    pub change_in_oi: Option<Decimal>,
    pub open_interest: Option<String>,
    pub change: Option<Decimal>,
    pub last_price: Option<String>,
}

impl ChainLeg {
    pub fn from_tick(tick: Option<&Tick>) -> Self {
        let Some(tick) = tick else {
            return Self::default();
        };
        Self {
            low: tick.low.clone(),
            high: tick.high.clone(),
            open: tick.open.clone(),
            volume: tick.volume.clone(),
            change_in_oi: change_in_oi(
                tick.open_interest.as_deref(),
                tick.prev_open_interest.as_deref(),
            ),
            open_interest: tick.open_interest.clone(),
            change: change(tick.last_price.as_deref(), tick.prev_close.as_deref()),
            last_price: tick.last_price.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainRow {
    pub strike: Price,
    pub call: ChainLeg,
    pub put: ChainLeg,
    /// Strike equals the current ATM.
    pub is_atm: bool,
}

impl ChainRow {
    /// Cells in `CHAIN_HEADERS` order: call side mirrored around the strike.
    pub fn to_cells(&self) -> [String; 17] {
        let ce = &self.call;
        let pe = &self.put;
        [
            cell(&ce.low),
            cell(&ce.high),
            cell(&ce.open),
            cell(&ce.volume),
            decimal_cell(ce.change_in_oi),
            cell(&ce.open_interest),
            decimal_cell(ce.change),
            cell(&ce.last_price),
            self.strike.normalize().to_string(),
            cell(&pe.last_price),
            decimal_cell(pe.change),
            cell(&pe.open_interest),
            decimal_cell(pe.change_in_oi),
            cell(&pe.volume),
            cell(&pe.open),
            cell(&pe.high),
            cell(&pe.low),
        ]
    }
}

/// Rows for the configured indices present in `snapshot`, in config order.
pub fn project_indices(indices: &[IndexConfig], snapshot: &FeedSnapshot) -> Vec<IndexRow> {
    indices
        .iter()
        .filter_map(|index| {
            snapshot
                .get(&index.key)
                .map(|tick| IndexRow::from_tick(index, tick))
        })
        .collect()
}

/// Rows for every strike of `chain`, ascending.
pub fn project_chain(chain: &ChainWindow, snapshot: &FeedSnapshot) -> Vec<ChainRow> {
    let atm = chain.window.atm;
    chain
        .tokens
        .iter()
        .map(|(&strike, legs)| ChainRow {
            strike,
            call: ChainLeg::from_tick(legs.call.as_ref().and_then(|k| snapshot.get(k))),
            put: ChainLeg::from_tick(legs.put.as_ref().and_then(|k| snapshot.get(k))),
            is_atm: strike == atm,
        })
        .collect()
}

/// Publishes index rows every period.
pub struct IndexProjector {
    indices: Vec<IndexConfig>,
    feed: Arc<FeedStore>,
    interval: Duration,
    rows_tx: watch::Sender<Vec<IndexRow>>,
}

impl IndexProjector {
    pub fn new(indices: Vec<IndexConfig>, feed: Arc<FeedStore>, interval: Duration) -> Self {
        let (rows_tx, _) = watch::channel(Vec::new());
        Self {
            indices,
            feed,
            interval,
            rows_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<IndexRow>> {
        self.rows_tx.subscribe()
    }

    /// Project once and publish. Returns the number of rows.
    pub fn project_once(&self) -> usize {
        let rows = project_indices(&self.indices, &self.feed.snapshot());
        let count = rows.len();
        self.rows_tx.send_replace(rows);
        Metrics::projected_rows("index", count);
        count
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(indices = self.indices.len(), "Index projector started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Index projector shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.project_once();
                }
            }
        }
    }
}

/// Publishes chain rows for one index every period once a window exists.
pub struct ChainProjector {
    symbol: String,
    feed: Arc<FeedStore>,
    window_rx: watch::Receiver<Option<Arc<ChainWindow>>>,
    interval: Duration,
    rows_tx: watch::Sender<Vec<ChainRow>>,
}

impl ChainProjector {
    pub fn new(
        symbol: impl Into<String>,
        feed: Arc<FeedStore>,
        window_rx: watch::Receiver<Option<Arc<ChainWindow>>>,
        interval: Duration,
    ) -> Self {
        let (rows_tx, _) = watch::channel(Vec::new());
        Self {
            symbol: symbol.into(),
            feed,
            window_rx,
            interval,
            rows_tx,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ChainRow>> {
        self.rows_tx.subscribe()
    }

    /// Project once and publish. `None` while no window has been built.
    pub fn project_once(&self) -> Option<usize> {
        let chain = self.window_rx.borrow().clone()?;
        let rows = project_chain(&chain, &self.feed.snapshot());
        let count = rows.len();
        self.rows_tx.send_replace(rows);
        Metrics::projected_rows(&self.symbol, count);
        Some(count)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(symbol = %self.symbol, "Chain projector started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!(symbol = %self.symbol, "Chain projector shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if self.project_once().is_none() {
                        debug!(symbol = %self.symbol, "No strike window yet");
                    }
                }
            }
        }
    }
}
