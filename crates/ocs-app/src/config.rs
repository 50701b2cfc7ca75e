//! Application configuration.
//!
//! Loaded from a TOML file, then overridden by `OCS__SECTION__KEY`
//! environment variables (e.g. `OCS__SESSION__SESSION_TOKEN`). Every field
//! has a default so a minimal file only needs the session credentials.

use crate::error::{AppError, AppResult};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use ocs_chain::{ChainTrackerConfig, IndexConfig};
use ocs_core::InstrumentKey;
use ocs_feed::LivenessConfig;
use ocs_registry::LoaderConfig;
use ocs_ws::{ConnectionConfig, FeedType, SessionCredentials, SubscriptionConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "OCS";

/// Broker session used for the streaming login.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub user_id: String,
    /// Defaults to `user_id` when empty.
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub session_token: String,
}

impl SessionConfig {
    pub fn account(&self) -> &str {
        if self.account_id.is_empty() {
            &self.user_id
        } else {
            &self.account_id
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("user_id", &self.user_id)
            .field("account_id", &self.account_id)
            .field("session_token", &"<redacted>")
            .finish()
    }
}

/// WebSocket session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Feed used for instrument subscriptions.
    #[serde(default)]
    pub feed_type: FeedType,
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts (ms). Default: 100.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Heartbeat interval (ms). Default: 3,000.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout (ms). Default: 10,000.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Subscribe order updates for the session's account. Default: true.
    #[serde(default = "default_true")]
    pub subscribe_orders: bool,
}

fn default_reconnect_delay_ms() -> u64 {
    100
}

fn default_heartbeat_interval_ms() -> u64 {
    3_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            feed_type: FeedType::default(),
            max_reconnect_attempts: 0,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            subscribe_orders: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSection {
    /// Instruments per subscribe request. Default: 30.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_max_batch_size() -> usize {
    ocs_ws::DEFAULT_MAX_BATCH_SIZE
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Feed liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessSection {
    /// Reference instrument. Default: `NSE|26009` (Nifty Bank).
    #[serde(default = "default_liveness_reference")]
    pub reference: InstrumentKey,
    /// Unchanged-for window before warning (s). Default: 60.
    #[serde(default = "default_max_staleness_secs")]
    pub max_staleness_secs: u64,
    /// Poll interval (ms). Default: 2,000.
    #[serde(default = "default_liveness_poll_ms")]
    pub poll_interval_ms: u64,
}

fn default_liveness_reference() -> InstrumentKey {
    InstrumentKey::from_parts("NSE", "26009").expect("literal instrument key is valid")
}

fn default_max_staleness_secs() -> u64 {
    60
}

fn default_liveness_poll_ms() -> u64 {
    2_000
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            reference: default_liveness_reference(),
            max_staleness_secs: default_max_staleness_secs(),
            poll_interval_ms: default_liveness_poll_ms(),
        }
    }
}

/// Symbol master cache and load retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMasterSection {
    /// JSON cache of the day's symbol master.
    #[serde(default = "default_symbol_master_path")]
    pub path: PathBuf,
    #[serde(default = "default_load_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_load_retry_ms")]
    pub retry_delay_ms: u64,
    /// Furthest acceptable nearest expiry of the probe symbol (days).
    #[serde(default = "default_max_expiry_days")]
    pub max_expiry_days: i64,
    #[serde(default = "default_probe_symbol")]
    pub probe_symbol: String,
}

fn default_symbol_master_path() -> PathBuf {
    PathBuf::from("data/symbols.json")
}

fn default_load_attempts() -> u32 {
    10
}

fn default_load_retry_ms() -> u64 {
    3_000
}

fn default_max_expiry_days() -> i64 {
    6
}

fn default_probe_symbol() -> String {
    "BANKNIFTY".to_string()
}

impl Default for SymbolMasterSection {
    fn default() -> Self {
        Self {
            path: default_symbol_master_path(),
            max_attempts: default_load_attempts(),
            retry_delay_ms: default_load_retry_ms(),
            max_expiry_days: default_max_expiry_days(),
            probe_symbol: default_probe_symbol(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Port for the `/metrics` endpoint; disabled when unset.
    #[serde(default)]
    pub metrics_port: Option<u16>,
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_filter: Option<String>,
}

/// Index shown in the index table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub key: InstrumentKey,
}

/// Option chain to track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Underlying symbol in the symbol master.
    pub symbol: String,
    /// Index instrument driving the ATM strike.
    pub index_key: InstrumentKey,
    /// Strikes on each side of ATM. Default: 10.
    #[serde(default = "default_strike_count")]
    pub strike_count: u32,
}

fn default_strike_count() -> u32 {
    10
}

fn default_indices() -> Vec<IndexEntry> {
    [
        ("NIFTY", "26000"),
        ("BANKNIFTY", "26009"),
        ("FINNIFTY", "26037"),
        ("INDIAVIX", "26017"),
    ]
    .into_iter()
    .filter_map(|(name, token)| {
        InstrumentKey::from_parts("NSE", token)
            .ok()
            .map(|key| IndexEntry {
                name: name.to_string(),
                key,
            })
    })
    .collect()
}

fn default_chains() -> Vec<ChainEntry> {
    [("NIFTY", "26000"), ("BANKNIFTY", "26009"), ("FINNIFTY", "26037")]
        .into_iter()
        .filter_map(|(symbol, token)| {
            InstrumentKey::from_parts("NSE", token)
                .ok()
                .map(|index_key| ChainEntry {
                    symbol: symbol.to_string(),
                    index_key,
                    strike_count: default_strike_count(),
                })
        })
        .collect()
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Streaming WebSocket URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Chain tracking and projection period (ms). Default: 1,000.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub subscription: SubscriptionSection,
    #[serde(default)]
    pub liveness: LivenessSection,
    #[serde(default)]
    pub symbol_master: SymbolMasterSection,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default = "default_indices")]
    pub indices: Vec<IndexEntry>,
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainEntry>,
}

fn default_ws_url() -> String {
    "wss://api.shoonya.com/NorenWSTP/".to_string()
}

fn default_refresh_interval_ms() -> u64 {
    1_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            refresh_interval_ms: default_refresh_interval_ms(),
            session: SessionConfig::default(),
            websocket: WsConfig::default(),
            subscription: SubscriptionSection::default(),
            liveness: LivenessSection::default(),
            symbol_master: SymbolMasterSection::default(),
            telemetry: TelemetryConfig::default(),
            indices: default_indices(),
            chains: default_chains(),
        }
    }
}

/// Environment override source: `OCS__WEBSOCKET__RECONNECT_DELAY_MS` maps to
/// `websocket.reconnect_delay_ms`.
fn env_overrides(source: Option<config::Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .source(source)
}

impl AppConfig {
    /// Load from a TOML file plus environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        Self::load(
            Config::builder()
                .add_source(File::new(path, FileFormat::Toml))
                .add_source(env_overrides(None)),
        )
    }

    /// Parse TOML text without environment overrides.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn load(builder: ConfigBuilder<DefaultState>) -> AppResult<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> AppResult<()> {
        if self.ws_url.is_empty() {
            return Err(AppError::Config("ws_url must be set".to_string()));
        }
        if self.refresh_interval_ms == 0 {
            return Err(AppError::Config(
                "refresh_interval_ms must be positive".to_string(),
            ));
        }
        if self.liveness.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "liveness.poll_interval_ms must be positive".to_string(),
            ));
        }
        if let Some(chain) = self.chains.iter().find(|c| c.symbol.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "chain for {} has an empty symbol",
                chain.index_key
            )));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let ws = &self.websocket;
        ConnectionConfig {
            url: self.ws_url.clone(),
            credentials: SessionCredentials {
                user_id: self.session.user_id.clone(),
                account_id: self.session.account().to_string(),
                session_token: self.session.session_token.clone(),
            },
            feed_type: ws.feed_type,
            max_reconnect_attempts: ws.max_reconnect_attempts,
            reconnect_delay_ms: ws.reconnect_delay_ms,
            heartbeat_interval_ms: ws.heartbeat_interval_ms,
            heartbeat_timeout_ms: ws.heartbeat_timeout_ms,
            order_account: ws
                .subscribe_orders
                .then(|| self.session.account().to_string())
                .filter(|account| !account.is_empty()),
            ..ConnectionConfig::default()
        }
    }

    pub fn subscription_config(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            max_batch_size: self.subscription.max_batch_size,
        }
    }

    pub fn liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            max_staleness: Duration::from_secs(self.liveness.max_staleness_secs),
            poll_interval: Duration::from_millis(self.liveness.poll_interval_ms),
            ..LivenessConfig::new(self.liveness.reference.clone())
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        let sm = &self.symbol_master;
        LoaderConfig {
            max_attempts: sm.max_attempts,
            retry_delay: Duration::from_millis(sm.retry_delay_ms),
            max_expiry_days: sm.max_expiry_days,
            probe_symbol: sm.probe_symbol.clone(),
        }
    }

    pub fn index_configs(&self) -> Vec<IndexConfig> {
        self.indices
            .iter()
            .map(|i| IndexConfig {
                name: i.name.clone(),
                key: i.key.clone(),
            })
            .collect()
    }

    pub fn tracker_configs(&self) -> Vec<ChainTrackerConfig> {
        self.chains
            .iter()
            .map(|c| ChainTrackerConfig {
                strike_count: c.strike_count,
                poll_interval: self.refresh_interval(),
                ..ChainTrackerConfig::new(c.symbol.clone(), c.index_key.clone())
            })
            .collect()
    }

    /// Instruments subscribed at startup: every index plus the liveness reference.
    pub fn startup_instruments(&self) -> Vec<InstrumentKey> {
        let mut keys: Vec<InstrumentKey> = self.indices.iter().map(|i| i.key.clone()).collect();
        keys.extend(self.chains.iter().map(|c| c.index_key.clone()));
        keys.push(self.liveness.reference.clone());
        keys
    }

    /// Underlying symbols the symbol master must know.
    pub fn chain_symbols(&self) -> Vec<String> {
        self.chains.iter().map(|c| c.symbol.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
ws_url = "wss://example.test/NorenWSTP/"
refresh_interval_ms = 500

[session]
user_id = "FA1234"
session_token = "secret"

[websocket]
feed_type = "touchline"

[[indices]]
name = "NIFTY"
key = "NSE|26000"

[[chains]]
symbol = "NIFTY"
index_key = "NSE|26000"
strike_count = 5
"#;

    fn sample_with_env(vars: &[(&str, &str)]) -> AppResult<AppConfig> {
        let env = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::load(
            Config::builder()
                .add_source(File::from_str(SAMPLE, FileFormat::Toml))
                .add_source(env_overrides(Some(env))),
        )
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_interval(), Duration::from_millis(1000));
        assert_eq!(config.liveness.reference.as_str(), "NSE|26009");
        assert_eq!(config.subscription.max_batch_size, 30);
        assert_eq!(config.indices.len(), 4);
        assert_eq!(config.chain_symbols(), vec!["NIFTY", "BANKNIFTY", "FINNIFTY"]);
        assert_eq!(config.telemetry.metrics_port, None);
    }

    #[test]
    fn test_from_toml_str() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.refresh_interval_ms, 500);
        assert_eq!(config.websocket.feed_type, FeedType::Touchline);
        assert_eq!(config.websocket.reconnect_delay_ms, 100);
        assert_eq!(config.session.account(), "FA1234");
        assert_eq!(config.indices.len(), 1);
        assert_eq!(config.chains[0].strike_count, 5);
    }

    #[test]
    fn test_env_overrides_file() {
        let config = sample_with_env(&[
            ("OCS__SESSION__SESSION_TOKEN", "from-env"),
            ("OCS__WEBSOCKET__RECONNECT_DELAY_MS", "250"),
            ("OCS__REFRESH_INTERVAL_MS", "2000"),
            ("UNRELATED", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.session.session_token, "from-env");
        assert_eq!(config.session.user_id, "FA1234");
        assert_eq!(config.websocket.reconnect_delay_ms, 250);
        assert_eq!(config.refresh_interval_ms, 2000);
    }

    #[test]
    fn test_rejects_zero_refresh_interval() {
        let result = sample_with_env(&[("OCS__REFRESH_INTERVAL_MS", "0")]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_connection_config() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        let conn = config.connection_config();
        assert_eq!(conn.url, "wss://example.test/NorenWSTP/");
        assert_eq!(conn.credentials.account_id, "FA1234");
        assert_eq!(conn.feed_type, FeedType::Touchline);
        assert_eq!(conn.order_account.as_deref(), Some("FA1234"));
        assert!(!format!("{:?}", config.session).contains("secret"));
    }

    #[test]
    fn test_tracker_configs_use_refresh_interval() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        let trackers = config.tracker_configs();
        assert_eq!(trackers.len(), 1);
        assert_eq!(trackers[0].symbol, "NIFTY");
        assert_eq!(trackers[0].strike_count, 5);
        assert_eq!(trackers[0].poll_interval, Duration::from_millis(500));

        let startup: Vec<String> = config
            .startup_instruments()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(startup, vec!["NSE|26000", "NSE|26000", "NSE|26009"]);
    }

    #[test]
    fn test_shipped_default_file_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
        let content = std::fs::read_to_string(path).unwrap();
        let config = AppConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.telemetry.metrics_port, Some(9100));
        assert_eq!(config.indices.len(), 4);
        assert_eq!(config.chain_symbols(), vec!["NIFTY", "BANKNIFTY", "FINNIFTY"]);
        assert_eq!(config.chains[2].index_key.as_str(), "NSE|26037");
        assert_eq!(config.websocket.feed_type, FeedType::Depth);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("refresh_interval_ms"));
        assert!(toml_str.contains("[[chains]]"));
    }
}
