//! In-memory symbol master.
//!
//! Holds the broker's contract list and indexes option contracts by
//! `(symbol, expiry, option type, strike)` for token resolution.

use crate::error::{RegistryError, RegistryResult};
use crate::resolver::SymbolResolver;
use chrono::{Local, NaiveDate};
use ocs_core::{Exchange, OptionType, Price};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

/// One contract row of the symbol master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScripRecord {
    #[serde(rename = "Exchange")]
    pub exchange: Exchange,
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "LotSize")]
    pub lot_size: u32,
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "TradingSymbol")]
    pub trading_symbol: String,
    #[serde(rename = "Expiry", default, with = "expiry_format")]
    pub expiry: Option<NaiveDate>,
    /// Instrument class, e.g. `OPTIDX`, `FUTIDX`, `OPTSTK`.
    #[serde(rename = "Instrument")]
    pub instrument: String,
    /// `CE`, `PE`, or `XX` for non-options.
    #[serde(rename = "OptionType", default)]
    pub option_type: Option<String>,
    #[serde(rename = "StrikePrice", default)]
    pub strike: Option<Price>,
}

impl ScripRecord {
    /// Option leg details when this row is an option contract.
    pub fn option_leg(&self) -> Option<(NaiveDate, OptionType, Price)> {
        if !self.instrument.starts_with("OPT") {
            return None;
        }
        let option_type = self.option_type.as_deref()?.parse().ok()?;
        Some((self.expiry?, option_type, self.strike?.normalize()))
    }
}

/// Expiry dates are written as `28-NOV-2024`; empty means none.
mod expiry_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%d-%b-%Y";

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => s.serialize_str(&date.format(FORMAT).to_string().to_uppercase()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw, FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

type ContractKey = (String, NaiveDate, OptionType, Price);

/// Indexed symbol master.
#[derive(Debug, Clone)]
pub struct SymbolMaster {
    records: Vec<ScripRecord>,
    contracts: HashMap<ContractKey, usize>,
    by_token: HashMap<(Exchange, String), usize>,
    /// Date "today" is evaluated against for expiry lookups.
    as_of: NaiveDate,
}

impl SymbolMaster {
    /// Build from records, evaluating expiries against the local date.
    pub fn from_records(records: Vec<ScripRecord>) -> Self {
        Self::from_records_as_of(records, Local::now().date_naive())
    }

    pub fn from_records_as_of(records: Vec<ScripRecord>, as_of: NaiveDate) -> Self {
        let mut contracts = HashMap::new();
        let mut by_token = HashMap::new();

        for (idx, record) in records.iter().enumerate() {
            by_token.insert((record.exchange, record.token.clone()), idx);
            if let Some((expiry, option_type, strike)) = record.option_leg() {
                contracts.insert((record.symbol.clone(), expiry, option_type, strike), idx);
            }
        }

        Self {
            records,
            contracts,
            by_token,
            as_of,
        }
    }

    /// Parse a JSON array of records.
    pub fn from_json_str(json: &str) -> RegistryResult<Self> {
        let records: Vec<ScripRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    /// Load a JSON array of records from disk.
    pub async fn from_json_file(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let master = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            records = master.len(),
            contracts = master.contracts.len(),
            "Symbol master loaded"
        );
        Ok(master)
    }

    /// Re-evaluate expiry lookups against another date.
    #[must_use]
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by exchange and token.
    pub fn record(&self, exchange: Exchange, token: &str) -> Option<&ScripRecord> {
        self.by_token
            .get(&(exchange, token.to_string()))
            .map(|&idx| &self.records[idx])
    }

    /// Trading symbol of a token, e.g. `NIFTY28NOV24C24100`.
    pub fn trading_symbol(&self, exchange: Exchange, token: &str) -> Option<&str> {
        self.record(exchange, token)
            .map(|r| r.trading_symbol.as_str())
    }

    /// Lot size of the symbol's option contracts for `expiry`.
    pub fn lot_size(&self, symbol: &str, expiry: NaiveDate) -> RegistryResult<u32> {
        self.option_records(symbol)
            .find(|r| r.expiry == Some(expiry))
            .map(|r| r.lot_size)
            .ok_or_else(|| RegistryError::SymbolNotFound(format!("{symbol} {expiry}")))
    }

    /// Earliest option expiry on or after `on`.
    pub fn nearest_expiry_on(&self, symbol: &str, on: NaiveDate) -> RegistryResult<NaiveDate> {
        self.option_records(symbol)
            .filter_map(|r| r.expiry)
            .filter(|expiry| *expiry >= on)
            .min()
            .ok_or_else(|| RegistryError::NoExpiry(symbol.to_string()))
    }

    fn option_records<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a ScripRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.symbol == symbol && r.option_leg().is_some())
    }
}

impl SymbolResolver for SymbolMaster {
    fn resolve_token(
        &self,
        symbol: &str,
        strike: Price,
        option_type: OptionType,
        expiry: NaiveDate,
    ) -> RegistryResult<String> {
        let key = (symbol.to_string(), expiry, option_type, strike.normalize());
        self.contracts
            .get(&key)
            .map(|&idx| self.records[idx].token.clone())
            .ok_or_else(|| RegistryError::ContractNotFound {
                symbol: symbol.to_string(),
                strike,
                option_type,
                expiry,
            })
    }

    /// Smallest gap between distinct positive strikes of the nearest expiry.
    fn strike_spacing(&self, symbol: &str) -> RegistryResult<Price> {
        let expiry = self.nearest_expiry(symbol)?;
        let strikes: BTreeSet<Price> = self
            .option_records(symbol)
            .filter(|r| r.expiry == Some(expiry))
            .filter_map(|r| r.strike.map(|s| s.normalize()))
            .filter(Price::is_positive)
            .collect();

        strikes
            .iter()
            .zip(strikes.iter().skip(1))
            .filter_map(|(lower, upper)| upper.checked_sub(*lower))
            .min()
            .ok_or_else(|| RegistryError::NoStrikeSpacing(symbol.to_string()))
    }

    fn exchange(&self, symbol: &str) -> RegistryResult<Exchange> {
        self.option_records(symbol)
            .next()
            .or_else(|| self.records.iter().find(|r| r.symbol == symbol))
            .map(|r| r.exchange)
            .ok_or_else(|| RegistryError::SymbolNotFound(symbol.to_string()))
    }

    fn nearest_expiry(&self, symbol: &str) -> RegistryResult<NaiveDate> {
        self.nearest_expiry_on(symbol, self.as_of)
    }
}
