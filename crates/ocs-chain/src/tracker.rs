//! Per-index ATM strike window tracker.
//!
//! Polls the index LTP from the feed store. On the first valid price, and
//! whenever the price leaves the current hysteresis band, the strike window
//! is rebuilt: every leg is resolved through the symbol resolver, the new
//! ATM and window are published on watch channels, and the flat instrument
//! list is handed to the subscription manager.

use crate::error::ChainResult;
use crate::window::{ChainWindow, StrikeWindow, TokenMap};
use chrono::NaiveDate;
use ocs_core::{Exchange, InstrumentKey, OptionType, Price};
use ocs_feed::FeedStore;
use ocs_registry::DynSymbolResolver;
use ocs_telemetry::Metrics;
use ocs_ws::SubscriptionCommand;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tracker configuration for one index.
#[derive(Debug, Clone)]
pub struct ChainTrackerConfig {
    /// Underlying symbol as listed in the symbol master (e.g. `NIFTY`).
    pub symbol: String,
    /// Index instrument whose LTP drives the window.
    pub index_key: InstrumentKey,
    /// Strikes on each side of ATM.
    pub strike_count: u32,
    pub poll_interval: Duration,
}

impl ChainTrackerConfig {
    /// Config with 10 strikes per side and a 1 s poll.
    #[must_use]
    pub fn new(symbol: impl Into<String>, index_key: InstrumentKey) -> Self {
        Self {
            symbol: symbol.into(),
            index_key,
            strike_count: 10,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    /// No valid index price seen yet.
    Uninitialized,
    Tracking(StrikeWindow),
}

/// Tracks the ATM strike window of one index.
pub struct ChainWindowTracker {
    config: ChainTrackerConfig,
    resolver: DynSymbolResolver,
    feed: Arc<FeedStore>,
    spacing: Price,
    expiry: NaiveDate,
    exchange: Exchange,
    state: TrackerState,
    atm_tx: watch::Sender<Option<Price>>,
    window_tx: watch::Sender<Option<Arc<ChainWindow>>>,
    subscription_tx: mpsc::Sender<SubscriptionCommand>,
}

impl ChainWindowTracker {
    /// Resolve the symbol's spacing, nearest expiry and exchange up front.
    pub fn new(
        config: ChainTrackerConfig,
        resolver: DynSymbolResolver,
        feed: Arc<FeedStore>,
        subscription_tx: mpsc::Sender<SubscriptionCommand>,
    ) -> ChainResult<Self> {
        let spacing = resolver.strike_spacing(&config.symbol)?;
        let expiry = resolver.nearest_expiry(&config.symbol)?;
        let exchange = resolver.exchange(&config.symbol)?;

        info!(
            symbol = %config.symbol,
            index = %config.index_key,
            %spacing,
            %expiry,
            %exchange,
            strike_count = config.strike_count,
            "Chain tracker configured"
        );

        let (atm_tx, _) = watch::channel(None);
        let (window_tx, _) = watch::channel(None);

        Ok(Self {
            config,
            resolver,
            feed,
            spacing,
            expiry,
            exchange,
            state: TrackerState::Uninitialized,
            atm_tx,
            window_tx,
            subscription_tx,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn spacing(&self) -> Price {
        self.spacing
    }

    pub fn expiry(&self) -> NaiveDate {
        self.expiry
    }

    /// Current ATM strike, `None` until the first window is built.
    pub fn atm_receiver(&self) -> watch::Receiver<Option<Price>> {
        self.atm_tx.subscribe()
    }

    /// Current window with its resolved instruments.
    pub fn window_receiver(&self) -> watch::Receiver<Option<Arc<ChainWindow>>> {
        self.window_tx.subscribe()
    }

    /// Check the index price once. Returns the new window if one was built.
    pub async fn poll(&mut self) -> Option<Arc<ChainWindow>> {
        let ltp = self
            .feed
            .last_price(&self.config.index_key)
            .filter(Price::is_positive)?;

        if let TrackerState::Tracking(window) = &self.state {
            if !window.needs_rebuild(ltp) {
                return None;
            }
            debug!(
                symbol = %self.config.symbol,
                %ltp,
                lower = %window.band.lower,
                upper = %window.band.upper,
                "Index left hysteresis band"
            );
        }

        let Some(window) =
            StrikeWindow::new(ltp, self.spacing, self.config.strike_count, self.expiry)
        else {
            warn!(symbol = %self.config.symbol, %ltp, "Index price out of range, window kept");
            return None;
        };

        let chain = Arc::new(self.build(window));
        let atm = chain.window.atm;

        self.state = TrackerState::Tracking(chain.window.clone());
        self.atm_tx.send_replace(Some(atm));
        self.window_tx.send_replace(Some(chain.clone()));
        Metrics::window_rebuilt(&self.config.symbol, atm.inner().to_f64().unwrap_or_default());

        let keys = chain.tokens.instrument_keys();
        info!(
            symbol = %self.config.symbol,
            %ltp,
            %atm,
            strikes = chain.tokens.len(),
            instruments = keys.len(),
            "Strike window rebuilt"
        );

        if self
            .subscription_tx
            .send(SubscriptionCommand::Desired(keys))
            .await
            .is_err()
        {
            warn!(symbol = %self.config.symbol, "Subscription manager gone, window not subscribed");
        }

        Some(chain)
    }

    fn build(&self, window: StrikeWindow) -> ChainWindow {
        let mut tokens = TokenMap::new();

        for &strike in &window.strikes {
            for option_type in OptionType::BOTH {
                match self.resolve_leg(strike, option_type) {
                    Ok(key) => tokens.insert(strike, option_type, key),
                    Err(e) => {
                        warn!(
                            symbol = %self.config.symbol,
                            %strike,
                            %option_type,
                            error = %e,
                            "Leg not resolved, omitted from window"
                        );
                        Metrics::resolve_failure(&self.config.symbol);
                    }
                }
            }
        }

        ChainWindow { window, tokens }
    }

    fn resolve_leg(&self, strike: Price, option_type: OptionType) -> ChainResult<InstrumentKey> {
        let token =
            self.resolver
                .resolve_token(&self.config.symbol, strike, option_type, self.expiry)?;
        Ok(InstrumentKey::new(self.exchange, token)?)
    }

    /// Poll on the configured interval until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            symbol = %self.config.symbol,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Chain tracker started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!(symbol = %self.config.symbol, "Chain tracker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use mockall::mock;
    use ocs_core::Tick;
    use ocs_registry::{RegistryError, RegistryResult, SymbolResolver};
    use rust_decimal_macros::dec;

    mock! {
        pub Resolver {}

        impl SymbolResolver for Resolver {
            fn resolve_token(
                &self,
                symbol: &str,
                strike: Price,
                option_type: OptionType,
                expiry: NaiveDate,
            ) -> RegistryResult<String>;
            fn strike_spacing(&self, symbol: &str) -> RegistryResult<Price>;
            fn exchange(&self, symbol: &str) -> RegistryResult<Exchange>;
            fn nearest_expiry(&self, symbol: &str) -> RegistryResult<NaiveDate>;
        }
    }

    fn index_key() -> InstrumentKey {
        "NSE|26000".parse().unwrap()
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 28).unwrap()
    }

    /// Resolver over a 100-point NIFTY chain; `missing` legs fail to resolve.
    fn resolver(missing: Vec<(Price, OptionType)>) -> MockResolver {
        let mut resolver = MockResolver::new();
        resolver
            .expect_strike_spacing()
            .returning(|_| Ok(Price::new(dec!(100))));
        resolver.expect_nearest_expiry().returning(|_| Ok(expiry()));
        resolver.expect_exchange().returning(|_| Ok(Exchange::Nfo));
        resolver
            .expect_resolve_token()
            .returning(move |symbol, strike, option_type, expiry| {
                if missing.contains(&(strike, option_type)) {
                    Err(RegistryError::ContractNotFound {
                        symbol: symbol.to_string(),
                        strike,
                        option_type,
                        expiry,
                    })
                } else {
                    Ok(format!("{}{}", option_type.code(), strike))
                }
            });
        resolver
    }

    fn tracker(
        resolver: MockResolver,
        strike_count: u32,
    ) -> (
        ChainWindowTracker,
        Arc<FeedStore>,
        mpsc::Receiver<SubscriptionCommand>,
    ) {
        let feed = Arc::new(FeedStore::new());
        let (tx, rx) = mpsc::channel(8);
        let config = ChainTrackerConfig {
            strike_count,
            ..ChainTrackerConfig::new("NIFTY", index_key())
        };
        let tracker =
            ChainWindowTracker::new(config, Arc::new(resolver), feed.clone(), tx).unwrap();
        (tracker, feed, rx)
    }

    fn set_ltp(feed: &FeedStore, lp: &str) {
        feed.write(
            index_key(),
            Tick {
                last_price: Some(lp.to_string()),
                ..Default::default()
            },
        );
    }

    fn desired(rx: &mut mpsc::Receiver<SubscriptionCommand>) -> Vec<String> {
        match rx.try_recv() {
            Ok(SubscriptionCommand::Desired(keys)) => keys.into_iter().map(String::from).collect(),
            other => panic!("expected desired list, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_price_stays_uninitialized() {
        let (mut tracker, feed, mut rx) = tracker(resolver(vec![]), 2);

        assert!(tracker.poll().await.is_none());
        set_ltp(&feed, "not-a-number");
        assert!(tracker.poll().await.is_none());

        assert_eq!(tracker.state(), &TrackerState::Uninitialized);
        assert_eq!(*tracker.atm_receiver().borrow(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_price_is_ignored() {
        let (mut tracker, feed, mut rx) = tracker(resolver(vec![]), 2);

        set_ltp(&feed, "79228162514264337593543950335");
        assert!(tracker.poll().await.is_none());
        assert_eq!(tracker.state(), &TrackerState::Uninitialized);

        set_ltp(&feed, "24110");
        assert!(tracker.poll().await.is_some());
        desired(&mut rx);

        set_ltp(&feed, "79228162514264337593543950335");
        assert!(tracker.poll().await.is_none());
        match tracker.state() {
            TrackerState::Tracking(window) => assert_eq!(window.atm, Price::new(dec!(24100))),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*tracker.atm_receiver().borrow(), Some(Price::new(dec!(24100))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_first_price_builds_window() {
        let (mut tracker, feed, mut rx) = tracker(resolver(vec![]), 2);
        let atm = tracker.atm_receiver();
        let window = tracker.window_receiver();

        set_ltp(&feed, "24110");
        let chain = tracker.poll().await.unwrap();

        assert_eq!(chain.window.atm, Price::new(dec!(24100)));
        assert_eq!(
            chain.window.strikes,
            [23900, 24000, 24100, 24200, 24300]
                .into_iter()
                .map(|s| Price::new(s.into()))
                .collect::<Vec<_>>()
        );
        assert_eq!(*atm.borrow(), Some(Price::new(dec!(24100))));
        assert_eq!(window.borrow().as_deref(), Some(chain.as_ref()));

        assert_eq!(
            desired(&mut rx),
            vec![
                "NFO|CE23900",
                "NFO|CE24000",
                "NFO|CE24100",
                "NFO|CE24200",
                "NFO|CE24300",
                "NFO|PE23900",
                "NFO|PE24000",
                "NFO|PE24100",
                "NFO|PE24200",
                "NFO|PE24300",
            ]
        );
    }

    #[tokio::test]
    async fn test_hysteresis() {
        let (mut tracker, feed, mut rx) = tracker(resolver(vec![]), 10);

        set_ltp(&feed, "24110");
        assert!(tracker.poll().await.is_some());
        assert_eq!(desired(&mut rx).len(), 42);

        set_ltp(&feed, "24149");
        assert!(tracker.poll().await.is_none());
        set_ltp(&feed, "24050");
        assert!(tracker.poll().await.is_none());
        assert!(rx.try_recv().is_err());

        set_ltp(&feed, "24150");
        let chain = tracker.poll().await.unwrap();
        assert_eq!(chain.window.atm, Price::new(dec!(24200)));
        assert_eq!(chain.window.band.lower, Price::new(dec!(24150)));
        assert_eq!(*tracker.atm_receiver().borrow(), Some(Price::new(dec!(24200))));
        assert_eq!(desired(&mut rx).len(), 42);
    }

    #[tokio::test]
    async fn test_failed_leg_is_omitted() {
        let missing = vec![
            (Price::new(dec!(24300)), OptionType::Call),
            (Price::new(dec!(23900)), OptionType::Call),
            (Price::new(dec!(23900)), OptionType::Put),
        ];
        let (mut tracker, feed, mut rx) = tracker(resolver(missing), 2);

        set_ltp(&feed, "24100");
        let chain = tracker.poll().await.unwrap();

        // both legs of 23900 failed, so the strike is gone entirely
        assert_eq!(chain.tokens.len(), 4);
        assert!(chain.tokens.get(Price::new(dec!(23900))).is_none());
        let legs = chain.tokens.get(Price::new(dec!(24300))).unwrap();
        assert!(legs.call.is_none());
        assert!(legs.put.is_some());
        assert_eq!(desired(&mut rx).len(), 7);
    }

    #[test]
    fn test_new_fails_without_spacing() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_strike_spacing()
            .returning(|symbol| Err(RegistryError::NoStrikeSpacing(symbol.to_string())));

        let (tx, _rx) = mpsc::channel(1);
        let result = ChainWindowTracker::new(
            ChainTrackerConfig::new("NIFTY", index_key()),
            Arc::new(resolver),
            Arc::new(FeedStore::new()),
            tx,
        );
        assert!(matches!(
            result,
            Err(ChainError::Registry(RegistryError::NoStrikeSpacing(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_emits_desired_list() {
        let (tracker, feed, mut rx) = tracker(resolver(vec![]), 1);
        let shutdown = CancellationToken::new();
        set_ltp(&feed, "24101.35");

        let task = tokio::spawn(tracker.run(shutdown.clone()));

        match rx.recv().await {
            Some(SubscriptionCommand::Desired(keys)) => assert_eq!(keys.len(), 6),
            other => panic!("unexpected {other:?}"),
        }

        shutdown.cancel();
        task.await.unwrap();
    }
}
