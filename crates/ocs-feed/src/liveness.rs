//! Feed liveness monitoring.
//!
//! Watches the last-traded price of one reference instrument (an index that
//! always trades during market hours). If the value does not change for the
//! staleness window the feed is presumed dead and a warning is raised. The
//! timer restarts after each warning, so a dead feed produces one warning
//! per window rather than one per poll.

use crate::feed_store::FeedStore;
use ocs_core::InstrumentKey;
use ocs_telemetry::Metrics;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Liveness monitor configuration.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Instrument whose last price is watched.
    pub reference: InstrumentKey,
    /// Unchanged-for duration that triggers a warning.
    pub max_staleness: Duration,
    pub poll_interval: Duration,
}

impl LivenessConfig {
    /// Config with the default 60 s staleness window and 2 s polling.
    #[must_use]
    pub fn new(reference: InstrumentKey) -> Self {
        Self {
            reference,
            max_staleness: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Raised when the reference instrument has gone stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessWarning {
    /// Ticks were flowing but the value stopped changing.
    Frozen {
        reference: InstrumentKey,
        last_value: String,
        stale_for: Duration,
    },
    /// No value for the reference instrument at all.
    NoData {
        reference: InstrumentKey,
        stale_for: Duration,
    },
}

impl LivenessWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Frozen { .. } => "frozen",
            Self::NoData { .. } => "no_data",
        }
    }
}

impl fmt::Display for LivenessWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frozen {
                reference,
                last_value,
                stale_for,
            } => write!(
                f,
                "feed appears dead: {reference} stuck at {last_value} for {}s",
                stale_for.as_secs()
            ),
            Self::NoData {
                reference,
                stale_for,
            } => write!(
                f,
                "no data for {reference} in {}s, check the connection",
                stale_for.as_secs()
            ),
        }
    }
}

/// Feed liveness monitor.
pub struct FeedLivenessMonitor {
    config: LivenessConfig,
    feed: Arc<FeedStore>,
    last_seen: Option<String>,
    last_change: Instant,
    warning_tx: Option<mpsc::Sender<LivenessWarning>>,
}

impl FeedLivenessMonitor {
    pub fn new(config: LivenessConfig, feed: Arc<FeedStore>) -> Self {
        Self {
            config,
            feed,
            last_seen: None,
            last_change: Instant::now(),
            warning_tx: None,
        }
    }

    /// Forward warnings to an external consumer.
    ///
    /// Delivery never blocks polling: a full channel drops the warning.
    #[must_use]
    pub fn with_warning_channel(mut self, tx: mpsc::Sender<LivenessWarning>) -> Self {
        self.warning_tx = Some(tx);
        self
    }

    /// Feed one observation of the reference value taken at `now`.
    pub fn observe(&mut self, value: Option<String>, now: Instant) -> Option<LivenessWarning> {
        if value.is_some() && value != self.last_seen {
            self.last_seen = value;
            self.last_change = now;
            return None;
        }

        let stale_for = now.saturating_duration_since(self.last_change);
        if stale_for < self.config.max_staleness {
            return None;
        }

        self.last_change = now;
        let reference = self.config.reference.clone();
        Some(match (value, &self.last_seen) {
            (Some(_), Some(last)) => LivenessWarning::Frozen {
                reference,
                last_value: last.clone(),
                stale_for,
            },
            _ => LivenessWarning::NoData {
                reference,
                stale_for,
            },
        })
    }

    /// Read the reference instrument from the store and observe it.
    pub fn poll(&mut self, now: Instant) -> Option<LivenessWarning> {
        let value = self
            .feed
            .read(&self.config.reference)
            .and_then(|tick| tick.last_price);
        self.observe(value, now)
    }

    /// Poll on the configured interval until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            reference = %self.config.reference,
            max_staleness_secs = self.config.max_staleness.as_secs(),
            "Feed liveness monitor started"
        );

        self.last_change = Instant::now();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Feed liveness monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(warning) = self.poll(Instant::now()) {
                        self.report(warning);
                    }
                }
            }
        }
    }

    fn report(&self, warning: LivenessWarning) {
        warn!(kind = warning.kind(), "{warning}");
        Metrics::liveness_warning(warning.kind());

        if let Some(tx) = &self.warning_tx {
            if let Err(e) = tx.try_send(warning) {
                debug!(error = %e, "Liveness warning not delivered");
            }
        }
    }
}
