//! Subscription management.
//!
//! Tracks which instruments have been subscribed and turns "desired
//! instrument list" updates into batched transport subscribe calls. The set
//! only grows: instruments that drop out of a strike window stay subscribed.

use crate::transport::DynFeedTransport;
use ocs_core::InstrumentKey;
use ocs_telemetry::Metrics;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maximum keys per subscribe call accepted by the broker.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 30;

#[derive(Debug, Default)]
struct SetInner {
    ordered: Vec<InstrumentKey>,
    members: HashSet<InstrumentKey>,
}

/// Set of instrument keys currently subscribed.
///
/// Iteration order is insertion order, so a forced resubscribe replays
/// instruments in the order they were first requested.
#[derive(Debug, Default)]
pub struct InstrumentSet {
    inner: RwLock<SetInner>,
}

impl InstrumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every subscribed key.
    pub fn current(&self) -> Vec<InstrumentKey> {
        self.inner.read().ordered.clone()
    }

    /// Add keys, ignoring ones already present.
    pub fn add_all(&self, keys: &[InstrumentKey]) {
        let mut inner = self.inner.write();
        for key in keys {
            if inner.members.insert(key.clone()) {
                inner.ordered.push(key.clone());
            }
        }
    }

    /// Keys of `desired` not yet subscribed, in input order, without duplicates.
    pub fn diff_new(&self, desired: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let inner = self.inner.read();
        let mut seen = HashSet::new();
        desired
            .iter()
            .filter(|key| !inner.members.contains(*key) && seen.insert(*key))
            .cloned()
            .collect()
    }

    pub fn contains(&self, key: &InstrumentKey) -> bool {
        self.inner.read().members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subscription manager configuration.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Maximum keys per transport subscribe call.
    pub max_batch_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Command accepted by [`SubscriptionManager::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionCommand {
    /// Subscribe whatever part of this list is not subscribed yet.
    Desired(Vec<InstrumentKey>),
    /// Re-issue every recorded subscription (after a new session opens).
    Resubscribe,
}

/// Diffs desired instrument lists against the subscribed set and issues
/// batched subscribe calls.
pub struct SubscriptionManager {
    config: SubscriptionConfig,
    instruments: Arc<InstrumentSet>,
    transport: DynFeedTransport,
}

impl SubscriptionManager {
    pub fn new(
        config: SubscriptionConfig,
        instruments: Arc<InstrumentSet>,
        transport: DynFeedTransport,
    ) -> Self {
        Self {
            config,
            instruments,
            transport,
        }
    }

    pub fn instruments(&self) -> &Arc<InstrumentSet> {
        &self.instruments
    }

    /// Subscribe the new part of `desired` (or all of it when `force`).
    ///
    /// Keys are sent in batches of at most `max_batch_size`, preserving
    /// order. Without `force`, each successfully issued batch is recorded in
    /// the instrument set. A failed batch is logged and skipped; it is not
    /// retried here. Returns the number of keys successfully issued.
    pub async fn update_desired(&self, desired: &[InstrumentKey], force: bool) -> usize {
        let to_add = if force {
            desired.to_vec()
        } else {
            self.instruments.diff_new(desired)
        };

        if to_add.is_empty() {
            debug!(force, "No new instruments to subscribe");
            return 0;
        }

        let batch_size = self.config.max_batch_size.max(1);
        let mut issued = 0;

        for batch in to_add.chunks(batch_size) {
            match self.transport.subscribe(batch).await {
                Ok(()) => {
                    if !force {
                        self.instruments.add_all(batch);
                    }
                    issued += batch.len();
                    Metrics::subscribe_batch(force, true);
                    debug!(count = batch.len(), force, "Subscribe batch issued");
                }
                Err(e) => {
                    Metrics::subscribe_batch(force, false);
                    warn!(error = %e, count = batch.len(), force, "Subscribe batch failed");
                }
            }
        }

        Metrics::subscribed_instruments(self.instruments.len());
        info!(
            requested = to_add.len(),
            issued,
            force,
            total = self.instruments.len(),
            "Subscriptions updated"
        );
        issued
    }

    /// Process commands until the channel closes or `shutdown` is cancelled.
    pub async fn run(
        self,
        mut commands: mpsc::Receiver<SubscriptionCommand>,
        shutdown: CancellationToken,
    ) {
        info!("Subscription manager started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Subscription manager shutting down");
                    break;
                }
                command = commands.recv() => {
                    match command {
                        Some(SubscriptionCommand::Desired(keys)) => {
                            self.update_desired(&keys, false).await;
                        }
                        Some(SubscriptionCommand::Resubscribe) => {
                            let current = self.instruments.current();
                            info!(count = current.len(), "Resubscribing after session open");
                            self.update_desired(&current, true).await;
                        }
                        None => {
                            info!("Subscription command channel closed");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockFeedTransport;

    fn keys(prefix: &str, count: usize) -> Vec<InstrumentKey> {
        (0..count)
            .map(|i| format!("{prefix}|{i}").parse().unwrap())
            .collect()
    }

    fn manager(batch: usize) -> (SubscriptionManager, Arc<MockFeedTransport>) {
        let transport = Arc::new(MockFeedTransport::new());
        let manager = SubscriptionManager::new(
            SubscriptionConfig {
                max_batch_size: batch,
            },
            Arc::new(InstrumentSet::new()),
            transport.clone(),
        );
        (manager, transport)
    }

    #[test]
    fn test_diff_new_preserves_order_and_dedups() {
        let set = InstrumentSet::new();
        let all = keys("NFO", 4);
        set.add_all(&all[1..2]);

        let desired = vec![all[3].clone(), all[1].clone(), all[0].clone(), all[3].clone()];
        assert_eq!(set.diff_new(&desired), vec![all[3].clone(), all[0].clone()]);
    }

    #[test]
    fn test_diff_new_is_idempotent() {
        let set = InstrumentSet::new();
        let all = keys("NFO", 6);
        set.add_all(&all[..2]);

        let first = set.diff_new(&all);
        let second = set.diff_new(&all);

        assert_eq!(first, all[2..].to_vec());
        assert_eq!(first, second);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_diff_new_empty_after_add() {
        let set = InstrumentSet::new();
        let desired = keys("NFO", 5);

        let first = set.diff_new(&desired);
        set.add_all(&first);

        assert!(set.diff_new(&desired).is_empty());
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_add_all_ignores_duplicates() {
        let set = InstrumentSet::new();
        let k = keys("NSE", 2);
        set.add_all(&k);
        set.add_all(&k);
        assert_eq!(set.current(), k);
    }

    #[tokio::test]
    async fn test_batches_of_thirty() {
        let (manager, transport) = manager(30);
        let desired = keys("NFO", 65);

        let issued = manager.update_desired(&desired, false).await;

        let calls = transport.calls();
        assert_eq!(issued, 65);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], desired[0..30]);
        assert_eq!(calls[1], desired[30..60]);
        assert_eq!(calls[2], desired[60..65]);
        assert_eq!(manager.instruments().current(), desired);
    }

    #[tokio::test]
    async fn test_only_new_keys_are_sent() {
        let (manager, transport) = manager(30);
        let desired = keys("NFO", 10);

        manager.update_desired(&desired[..6], false).await;
        transport.clear();
        manager.update_desired(&desired, false).await;

        assert_eq!(transport.calls(), vec![desired[6..].to_vec()]);
    }

    #[tokio::test]
    async fn test_empty_diff_is_noop() {
        let (manager, transport) = manager(30);
        let desired = keys("NFO", 3);
        manager.instruments().add_all(&desired);

        assert_eq!(manager.update_desired(&desired, false).await, 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_forced_resends_without_recording() {
        let (manager, transport) = manager(2);
        let desired = keys("NFO", 3);

        manager.update_desired(&desired, true).await;

        assert_eq!(transport.calls().len(), 2);
        assert!(manager.instruments().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_is_skipped_and_not_recorded() {
        let (manager, transport) = manager(2);
        transport.script_failures([false, true, false]);
        let desired = keys("NFO", 6);

        let issued = manager.update_desired(&desired, false).await;

        assert_eq!(issued, 4);
        assert_eq!(transport.calls().len(), 3);
        assert!(manager.instruments().contains(&desired[0]));
        assert!(!manager.instruments().contains(&desired[2]));
        assert!(!manager.instruments().contains(&desired[3]));
        assert!(manager.instruments().contains(&desired[5]));

        // the failed keys are picked up by the next diff
        transport.clear();
        manager.update_desired(&desired, false).await;
        assert_eq!(transport.calls(), vec![desired[2..4].to_vec()]);
    }

    #[tokio::test]
    async fn test_run_resubscribe_command() {
        let (manager, transport) = manager(30);
        let desired = keys("NFO", 3);
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(manager.run(rx, shutdown.clone()));
        tx.send(SubscriptionCommand::Desired(desired.clone())).await.unwrap();
        tx.send(SubscriptionCommand::Resubscribe).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(transport.calls(), vec![desired.clone(), desired]);
    }
}
