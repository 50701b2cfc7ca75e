//! Wire messages for the broker streaming protocol.
//!
//! Every frame is a JSON object discriminated by its `t` field. Outbound
//! requests are built with [`WsRequest`]; inbound frames decode into
//! [`WsMessage`].

use crate::error::WsResult;
use ocs_core::{CoreError, InstrumentKey, Tick};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source tag sent with the session-open request.
pub const API_SOURCE: &str = "API";

/// Market-data feed flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    /// Top-of-book quote stream.
    Touchline,
    /// Full market-depth stream (a superset of touchline fields).
    #[default]
    Depth,
}

impl FeedType {
    /// Metric / log label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Touchline => "touchline",
            Self::Depth => "depth",
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "t")]
pub enum WsRequest {
    /// Open (authenticate) the streaming session.
    #[serde(rename = "c")]
    Connect {
        uid: String,
        actid: String,
        susertoken: String,
        source: String,
    },
    #[serde(rename = "t")]
    SubscribeTouchline { k: String },
    #[serde(rename = "u")]
    UnsubscribeTouchline { k: String },
    #[serde(rename = "d")]
    SubscribeDepth { k: String },
    #[serde(rename = "ud")]
    UnsubscribeDepth { k: String },
    /// Subscribe to order updates for an account.
    #[serde(rename = "o")]
    SubscribeOrders { actid: String },
    #[serde(rename = "uo")]
    UnsubscribeOrders,
}

impl WsRequest {
    /// Create the session-open request.
    pub fn connect(user_id: &str, account_id: &str, session_token: &str) -> Self {
        Self::Connect {
            uid: user_id.to_string(),
            actid: account_id.to_string(),
            susertoken: session_token.to_string(),
            source: API_SOURCE.to_string(),
        }
    }

    /// Create a subscribe request for `keys` on the given feed.
    pub fn subscribe(feed: FeedType, keys: &[InstrumentKey]) -> Self {
        let k = join_keys(keys);
        match feed {
            FeedType::Touchline => Self::SubscribeTouchline { k },
            FeedType::Depth => Self::SubscribeDepth { k },
        }
    }

    /// Create an unsubscribe request for `keys` on the given feed.
    pub fn unsubscribe(feed: FeedType, keys: &[InstrumentKey]) -> Self {
        let k = join_keys(keys);
        match feed {
            FeedType::Touchline => Self::UnsubscribeTouchline { k },
            FeedType::Depth => Self::UnsubscribeDepth { k },
        }
    }

    pub fn subscribe_orders(account_id: &str) -> Self {
        Self::SubscribeOrders {
            actid: account_id.to_string(),
        }
    }

    /// Serialize to a text frame.
    pub fn to_json(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::SubscribeTouchline { .. } | Self::SubscribeDepth { .. } => "subscribe",
            Self::UnsubscribeTouchline { .. } | Self::UnsubscribeDepth { .. } => "unsubscribe",
            Self::SubscribeOrders { .. } => "subscribe_orders",
            Self::UnsubscribeOrders => "unsubscribe_orders",
        }
    }
}

/// Keys are `#`-joined in a single subscribe frame.
fn join_keys(keys: &[InstrumentKey]) -> String {
    keys.iter()
        .map(InstrumentKey::as_str)
        .collect::<Vec<_>>()
        .join("#")
}

/// Session-open acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectAck {
    #[serde(rename = "s")]
    pub status: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub emsg: Option<String>,
}

impl ConnectAck {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    /// Human-readable rejection reason.
    pub fn reason(&self) -> String {
        self.emsg.clone().unwrap_or_else(|| self.status.clone())
    }
}

/// Tick frame (acknowledgement or incremental feed).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickMessage {
    #[serde(rename = "e")]
    pub exchange: String,
    #[serde(rename = "tk")]
    pub token: String,
    #[serde(flatten)]
    pub tick: Tick,
}

impl TickMessage {
    /// Instrument key this frame updates.
    pub fn instrument_key(&self) -> Result<InstrumentKey, CoreError> {
        InstrumentKey::from_parts(&self.exchange, &self.token)
    }
}

/// Order status frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderMessage {
    #[serde(default)]
    pub norenordno: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tsym: Option<String>,
    #[serde(default)]
    pub reporttype: Option<String>,
    #[serde(default)]
    pub rejreason: Option<String>,
}

/// Inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "t")]
pub enum WsMessage {
    #[serde(rename = "ck")]
    ConnectAck(ConnectAck),
    /// Touchline acknowledgement (`tk`) or feed (`tf`).
    #[serde(rename = "tf", alias = "tk")]
    Touchline(TickMessage),
    /// Depth acknowledgement (`dk`) or feed (`df`).
    #[serde(rename = "df", alias = "dk")]
    Depth(TickMessage),
    #[serde(rename = "om")]
    Order(OrderMessage),
    /// Any other frame (order-subscribe acks, unsubscribe acks, ...).
    #[serde(other)]
    Other,
}

impl WsMessage {
    pub fn parse(text: &str) -> WsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
