//! Log-based display consumer.
//!
//! Stands in for a table UI: periodically renders the latest index and
//! chain rows into log lines and surfaces liveness warnings as soon as they
//! arrive.

use ocs_chain::{ChainRow, IndexRow, CHAIN_HEADERS, INDEX_HEADERS};
use ocs_core::Price;
use ocs_feed::LivenessWarning;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// `Header=value` pairs, skipping empty cells.
pub fn format_row(headers: &[&str], cells: &[String]) -> String {
    headers
        .iter()
        .zip(cells)
        .filter(|(_, cell)| !cell.is_empty())
        .map(|(header, cell)| format!("{header}={cell}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Chain rows and ATM strike of one index.
pub struct ChainView {
    pub symbol: String,
    pub rows: watch::Receiver<Vec<ChainRow>>,
    pub atm: watch::Receiver<Option<Price>>,
}

pub struct LogDisplay {
    indices: watch::Receiver<Vec<IndexRow>>,
    chains: Vec<ChainView>,
    warnings: mpsc::Receiver<LivenessWarning>,
    interval: Duration,
}

impl LogDisplay {
    pub fn new(
        indices: watch::Receiver<Vec<IndexRow>>,
        chains: Vec<ChainView>,
        warnings: mpsc::Receiver<LivenessWarning>,
        interval: Duration,
    ) -> Self {
        Self {
            indices,
            chains,
            warnings,
            interval,
        }
    }

    /// Render the current rows once.
    pub fn render(&mut self) {
        for row in self.indices.borrow_and_update().iter() {
            info!(target: "ocs::display", "{}", format_row(&INDEX_HEADERS, &row.to_cells()));
        }

        for view in &mut self.chains {
            let atm = *view.atm.borrow_and_update();
            let rows = view.rows.borrow_and_update();
            if rows.is_empty() {
                continue;
            }

            match rows.iter().find(|row| row.is_atm) {
                Some(row) => info!(
                    target: "ocs::display",
                    symbol = %view.symbol,
                    atm = ?atm.map(|p| p.to_string()),
                    strikes = rows.len(),
                    "{}",
                    format_row(&CHAIN_HEADERS, &row.to_cells())
                ),
                None => info!(
                    target: "ocs::display",
                    symbol = %view.symbol,
                    strikes = rows.len(),
                    "ATM strike not in window"
                ),
            }

            for row in rows.iter() {
                debug!(
                    target: "ocs::display",
                    symbol = %view.symbol,
                    "{}",
                    format_row(&CHAIN_HEADERS, &row.to_cells())
                );
            }
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Display shutting down");
                    break;
                }
                Some(warning) = self.warnings.recv() => {
                    error!(
                        target: "ocs::display",
                        kind = warning.kind(),
                        "LIVENESS ALERT: {warning}"
                    );
                }
                _ = ticker.tick() => self.render(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_row_skips_empty_cells() {
        let cells = ["NIFTY", "", "", "", "24000", "24100", "100", ""].map(String::from);
        assert_eq!(
            format_row(&INDEX_HEADERS, &cells),
            "Index=NIFTY Close=24000 LTP=24100 Change=100"
        );
    }
}
