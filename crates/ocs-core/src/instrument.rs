//! Instrument identification types.
//!
//! Every subscribable instrument is addressed by an `InstrumentKey` of the
//! form `"<EXCHANGE>|<TOKEN>"`, e.g. `"NSE|26000"` for the NIFTY index or
//! `"NFO|43512"` for one of its option contracts.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange segment code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    /// Cash segment (indices and equities).
    Nse,
    /// Derivatives segment of NSE.
    Nfo,
    Bse,
    /// Derivatives segment of BSE.
    Bfo,
    Cds,
    Mcx,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Nfo => "NFO",
            Self::Bse => "BSE",
            Self::Bfo => "BFO",
            Self::Cds => "CDS",
            Self::Mcx => "MCX",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = CoreError;

    /// Exchange codes are case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NSE" => Ok(Self::Nse),
            "NFO" => Ok(Self::Nfo),
            "BSE" => Ok(Self::Bse),
            "BFO" => Ok(Self::Bfo),
            "CDS" => Ok(Self::Cds),
            "MCX" => Ok(Self::Mcx),
            other => Err(CoreError::UnknownExchange(other.to_string())),
        }
    }
}

/// Call or put leg of an option strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionType {
    pub const BOTH: [OptionType; 2] = [OptionType::Call, OptionType::Put];

    /// Symbol-master code (`CE` / `PE`).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for OptionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CE" => Ok(Self::Call),
            "PE" => Ok(Self::Put),
            other => Err(CoreError::UnknownOptionType(other.to_string())),
        }
    }
}

/// Unique instrument identifier: `"<EXCHANGE>|<TOKEN>"`.
///
/// The key is ASCII, contains exactly one `|`, and both sides are non-empty.
/// The exchange part is kept verbatim so keys for segments this crate has no
/// `Exchange` variant for still round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentKey(String);

impl InstrumentKey {
    pub const SEPARATOR: char = '|';

    /// Build a key from an exchange and a token.
    pub fn new(exchange: Exchange, token: impl AsRef<str>) -> Result<Self, CoreError> {
        Self::from_parts(exchange.as_str(), token.as_ref())
    }

    /// Build a key from raw exchange and token text, validating both.
    pub fn from_parts(exchange: &str, token: &str) -> Result<Self, CoreError> {
        format!("{exchange}{}{token}", Self::SEPARATOR).parse()
    }

    /// Exchange part of the key.
    pub fn exchange(&self) -> &str {
        self.split().0
    }

    /// Token part of the key.
    pub fn token(&self) -> &str {
        self.split().1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // Validated at construction; the separator is always present.
        self.0
            .split_once(Self::SEPARATOR)
            .unwrap_or((self.0.as_str(), ""))
    }
}

impl FromStr for InstrumentKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(CoreError::InvalidInstrumentKey(s.to_string()));
        }
        let mut parts = s.split(Self::SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(exchange), Some(token), None) if !exchange.is_empty() && !token.is_empty() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(CoreError::InvalidInstrumentKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for InstrumentKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstrumentKey> for String {
    fn from(key: InstrumentKey) -> Self {
        key.0
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
