//! Symbol master loading with bounded retry.
//!
//! The broker publishes a fresh contract list each morning. Until it is
//! refreshed, the previous day's file may still list only expired or far
//! contracts, so a load is accepted only when the probe symbol's nearest
//! expiry is close enough to today. Failed or stale loads are retried a
//! fixed number of times before giving up with an explicit error.

use crate::error::{RegistryError, RegistryResult};
use crate::resolver::SymbolResolver;
use crate::symbol_master::SymbolMaster;
use chrono::NaiveDate;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Longest acceptable distance from today to the probe's nearest expiry.
    pub max_expiry_days: i64,
    /// Symbol whose expiry is checked (a weekly-expiring index).
    pub probe_symbol: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_secs(3),
            max_expiry_days: 6,
            probe_symbol: "BANKNIFTY".to_string(),
        }
    }
}

/// Reject a master whose probe symbol has no expiry within `max_days` of `today`.
pub fn check_freshness(
    master: &SymbolMaster,
    probe_symbol: &str,
    today: NaiveDate,
    max_days: i64,
) -> RegistryResult<NaiveDate> {
    let expiry = master.nearest_expiry_on(probe_symbol, today)?;
    let days = (expiry - today).num_days();
    if days > max_days {
        return Err(RegistryError::Stale(format!(
            "{probe_symbol} nearest expiry {expiry} is {days} days away"
        )));
    }
    Ok(expiry)
}

/// Bounded-retry symbol master loader.
#[derive(Debug, Clone, Default)]
pub struct SymbolMasterLoader {
    config: LoaderConfig,
}

impl SymbolMasterLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load from a JSON file, evaluating freshness against `today`.
    pub async fn load_file(&self, path: &Path, today: NaiveDate) -> RegistryResult<SymbolMaster> {
        self.load(
            || async move { Ok(SymbolMaster::from_json_file(path).await?.with_as_of(today)) },
            today,
        )
        .await
    }

    /// Run `source` until it yields a fresh master or attempts run out.
    pub async fn load<F, Fut>(
        &self,
        mut source: F,
        today: NaiveDate,
    ) -> RegistryResult<SymbolMaster>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RegistryResult<SymbolMaster>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let result = match source().await {
                Ok(master) => check_freshness(
                    &master,
                    &self.config.probe_symbol,
                    today,
                    self.config.max_expiry_days,
                )
                .map(|expiry| (master, expiry)),
                Err(e) => Err(e),
            };

            match result {
                Ok((master, expiry)) => {
                    info!(
                        attempt,
                        probe = %self.config.probe_symbol,
                        %expiry,
                        "Symbol master accepted"
                    );
                    return Ok(master);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Symbol master not usable yet");
                    last_error = e.to_string();
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(RegistryError::LoadFailed {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Probe-independent sanity check used after loading: every listed
    /// symbol must resolve an exchange.
    pub fn verify_symbols(master: &SymbolMaster, symbols: &[String]) -> RegistryResult<()> {
        for symbol in symbols {
            master.exchange(symbol)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol_master::tests::{date, sample_master};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(max_attempts: u32) -> LoaderConfig {
        LoaderConfig {
            max_attempts,
            retry_delay: Duration::from_secs(3),
            max_expiry_days: 6,
            probe_symbol: "NIFTY".to_string(),
        }
    }

    #[test]
    fn test_check_freshness() {
        let master = sample_master(date(2024, 11, 22));
        assert_eq!(
            check_freshness(&master, "NIFTY", date(2024, 11, 22), 6).unwrap(),
            date(2024, 11, 28)
        );
        assert!(matches!(
            check_freshness(&master, "NIFTY", date(2024, 11, 21), 6),
            Err(RegistryError::Stale(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_fresh() {
        let calls = Arc::new(AtomicU32::new(0));
        let loader = SymbolMasterLoader::new(config(10));
        let today = date(2024, 11, 25);

        let counter = calls.clone();
        let master = loader
            .load(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(RegistryError::Io(std::io::Error::other("not yet")))
                        } else {
                            Ok(sample_master(today))
                        }
                    }
                },
                today,
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!master.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let loader = SymbolMasterLoader::new(config(3));
        // every load is stale: nearest NIFTY expiry is 10 days out
        let today = date(2024, 11, 18);

        let counter = calls.clone();
        let result = loader
            .load(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(sample_master(today)) }
                },
                today,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RegistryError::LoadFailed {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("10 days"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_file_missing() {
        let loader = SymbolMasterLoader::new(LoaderConfig {
            max_attempts: 1,
            ..config(1)
        });
        let result = loader
            .load_file(Path::new("/nonexistent/symbols.json"), date(2024, 11, 25))
            .await;
        assert!(matches!(result, Err(RegistryError::LoadFailed { attempts: 1, .. })));
    }

    #[test]
    fn test_verify_symbols() {
        let master = sample_master(date(2024, 11, 25));
        assert!(SymbolMasterLoader::verify_symbols(&master, &["NIFTY".to_string()]).is_ok());
        assert!(SymbolMasterLoader::verify_symbols(&master, &["FINNIFTY".to_string()]).is_err());
    }
}
