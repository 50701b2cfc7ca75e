//! Main application orchestration.
//!
//! Wires the long-running tasks together:
//! - WebSocket session (connect, authenticate, reconnect)
//! - Feed ingest into the shared tick and order stores
//! - Subscription manager (diff, batch, resubscribe on session open)
//! - One strike-window tracker and one chain projector per index
//! - Index projector, feed liveness monitor, log display
//! - Optional `/metrics` endpoint

use crate::config::AppConfig;
use crate::display::{ChainView, LogDisplay};
use crate::error::{AppError, AppResult};
use chrono::Local;
use ocs_chain::{ChainProjector, ChainWindowTracker, IndexProjector};
use ocs_feed::{FeedIngestor, FeedLivenessMonitor, FeedStore, OrderStore};
use ocs_registry::{DynSymbolResolver, SymbolMaster, SymbolMasterLoader};
use ocs_ws::{
    ConnectionManager, DynFeedTransport, InstrumentSet, SubscriptionCommand, SubscriptionManager,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 4096;
const COMMAND_CHANNEL_CAPACITY: usize = 64;
const WARNING_CHANNEL_CAPACITY: usize = 16;
const DISPLAY_INTERVAL: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: AppConfig,
    feed: Arc<FeedStore>,
    orders: Arc<OrderStore>,
    instruments: Arc<InstrumentSet>,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            feed: Arc::new(FeedStore::new()),
            orders: Arc::new(OrderStore::new()),
            instruments: Arc::new(InstrumentSet::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops every task when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn feed(&self) -> &Arc<FeedStore> {
        &self.feed
    }

    pub fn orders(&self) -> &Arc<OrderStore> {
        &self.orders
    }

    /// Load today's symbol master and check every configured chain resolves.
    pub async fn load_symbol_master(&self) -> AppResult<Arc<SymbolMaster>> {
        let today = Local::now().date_naive();
        let path = &self.config.symbol_master.path;
        info!(path = %path.display(), %today, "Loading symbol master");

        let loader = SymbolMasterLoader::new(self.config.loader_config());
        let master = loader.load_file(path, today).await?;
        SymbolMasterLoader::verify_symbols(&master, &self.config.chain_symbols())?;

        info!(records = master.len(), "Symbol master loaded");
        Ok(Arc::new(master))
    }

    /// Run until Ctrl-C or until the shutdown token is cancelled.
    pub async fn run(self) -> AppResult<()> {
        let resolver: DynSymbolResolver = self.load_symbol_master().await?;
        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        // Transport
        let connection = Arc::new(ConnectionManager::with_shutdown(
            self.config.connection_config(),
            event_tx,
            self.shutdown.clone(),
        ));
        let transport: DynFeedTransport = Arc::new(connection.write_handle());
        {
            let connection = connection.clone();
            let shutdown = self.shutdown.clone();
            tasks.push((
                "connection",
                tokio::spawn(async move {
                    if let Err(e) = connection.connect().await {
                        error!(error = %e, "Streaming connection gave up");
                        shutdown.cancel();
                    }
                }),
            ));
        }

        // Ingest and subscriptions
        let ingestor = FeedIngestor::new(self.feed.clone(), self.orders.clone())
            .with_resubscribe(command_tx.clone());
        tasks.push((
            "ingest",
            tokio::spawn(ingestor.run(event_rx, self.shutdown.clone())),
        ));

        let subscriptions = SubscriptionManager::new(
            self.config.subscription_config(),
            self.instruments.clone(),
            transport,
        );
        tasks.push((
            "subscriptions",
            tokio::spawn(subscriptions.run(command_rx, self.shutdown.clone())),
        ));

        command_tx
            .send(SubscriptionCommand::Desired(
                self.config.startup_instruments(),
            ))
            .await
            .map_err(|_| AppError::Config("subscription manager stopped early".to_string()))?;

        // Chains
        let interval = self.config.refresh_interval();
        let mut chain_views = Vec::new();
        for tracker_config in self.config.tracker_configs() {
            let tracker = ChainWindowTracker::new(
                tracker_config,
                resolver.clone(),
                self.feed.clone(),
                command_tx.clone(),
            )?;
            let symbol = tracker.symbol().to_string();
            let projector = ChainProjector::new(
                symbol.clone(),
                self.feed.clone(),
                tracker.window_receiver(),
                interval,
            );
            chain_views.push(ChainView {
                symbol,
                rows: projector.subscribe(),
                atm: tracker.atm_receiver(),
            });

            tasks.push(("tracker", tokio::spawn(tracker.run(self.shutdown.clone()))));
            tasks.push((
                "chain_projector",
                tokio::spawn(projector.run(self.shutdown.clone())),
            ));
        }
        drop(command_tx);

        // Index table
        let index_projector =
            IndexProjector::new(self.config.index_configs(), self.feed.clone(), interval);
        let index_rows = index_projector.subscribe();
        tasks.push((
            "index_projector",
            tokio::spawn(index_projector.run(self.shutdown.clone())),
        ));

        // Liveness
        let (warning_tx, warning_rx) = mpsc::channel(WARNING_CHANNEL_CAPACITY);
        let liveness = FeedLivenessMonitor::new(self.config.liveness_config(), self.feed.clone())
            .with_warning_channel(warning_tx);
        tasks.push((
            "liveness",
            tokio::spawn(liveness.run(self.shutdown.clone())),
        ));

        let display = LogDisplay::new(index_rows, chain_views, warning_rx, DISPLAY_INTERVAL);
        tasks.push(("display", tokio::spawn(display.run(self.shutdown.clone()))));

        if let Some(port) = self.config.telemetry.metrics_port {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let shutdown = self.shutdown.clone();
            tasks.push((
                "metrics",
                tokio::spawn(async move {
                    if let Err(e) = ocs_telemetry::serve_metrics(addr, shutdown).await {
                        warn!(error = %e, "Metrics server stopped");
                    }
                }),
            ));
        }

        info!(tasks = tasks.len(), "Application running");

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Shutdown signal received");
            }
            () = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
        }

        self.shutdown.cancel();
        for (name, handle) in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => warn!(task = name, "Task did not stop in time"),
            }
        }

        info!(
            instruments = self.instruments.len(),
            orders = self.orders.len(),
            "Shut down"
        );
        Ok(())
    }
}
