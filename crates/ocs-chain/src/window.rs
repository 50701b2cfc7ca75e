//! Strike window arithmetic.
//!
//! A window is centred on the ATM strike and spans `strike_count` strikes on
//! each side. It is kept until the underlying leaves the hysteresis band
//! `[atm - spacing/2, atm + spacing/2)`, so small oscillations around a
//! midpoint never cause resubscription churn.
//!
//! Every constructor returns `None` when the arithmetic overflows, which only
//! happens for nonsensical feed prices; callers treat that like a missing LTP.

use chrono::NaiveDate;
use ocs_core::{InstrumentKey, OptionType, Price};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// ATM strike: `ltp` rounded to the nearest multiple of `spacing`.
#[inline]
pub fn atm_strike(ltp: Price, spacing: Price) -> Option<Price> {
    ltp.round_to_multiple(spacing)
}

/// Half-open price band `[lower, upper)` around an ATM strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HysteresisBand {
    pub lower: Price,
    pub upper: Price,
}

impl HysteresisBand {
    pub fn around(atm: Price, spacing: Price) -> Option<Self> {
        let half = spacing.checked_div(Decimal::TWO)?;
        Some(Self {
            lower: atm.checked_sub(half)?.normalize(),
            upper: atm.checked_add(half)?.normalize(),
        })
    }

    #[inline]
    pub fn contains(&self, ltp: Price) -> bool {
        ltp >= self.lower && ltp < self.upper
    }
}

/// `atm - count*spacing ..= atm + count*spacing`, ascending.
pub fn strike_ladder(atm: Price, spacing: Price, count: u32) -> Option<Vec<Price>> {
    let n = i64::from(count);
    (-n..=n)
        .map(|i| {
            let offset = spacing.checked_mul(Decimal::from(i))?;
            Some(atm.checked_add(offset)?.normalize())
        })
        .collect()
}

/// Strikes tracked for one index and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrikeWindow {
    pub atm: Price,
    pub spacing: Price,
    pub expiry: NaiveDate,
    pub band: HysteresisBand,
    /// Ascending, `2 * strike_count + 1` entries.
    pub strikes: Vec<Price>,
}

impl StrikeWindow {
    pub fn new(
        ltp: Price,
        spacing: Price,
        strike_count: u32,
        expiry: NaiveDate,
    ) -> Option<Self> {
        let atm = atm_strike(ltp, spacing)?;
        Some(Self {
            atm,
            spacing,
            expiry,
            band: HysteresisBand::around(atm, spacing)?,
            strikes: strike_ladder(atm, spacing, strike_count)?,
        })
    }

    /// True when `ltp` has left the band.
    #[inline]
    pub fn needs_rebuild(&self, ltp: Price) -> bool {
        !self.band.contains(ltp)
    }
}

/// Resolved instruments for one strike. A leg that failed to resolve is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrikeLegs {
    pub call: Option<InstrumentKey>,
    pub put: Option<InstrumentKey>,
}

impl StrikeLegs {
    pub fn leg(&self, option_type: OptionType) -> Option<&InstrumentKey> {
        match option_type {
            OptionType::Call => self.call.as_ref(),
            OptionType::Put => self.put.as_ref(),
        }
    }
}

/// Strike -> resolved legs, ordered by strike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    legs: BTreeMap<Price, StrikeLegs>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, strike: Price, option_type: OptionType, key: InstrumentKey) {
        let legs = self.legs.entry(strike).or_default();
        match option_type {
            OptionType::Call => legs.call = Some(key),
            OptionType::Put => legs.put = Some(key),
        }
    }

    pub fn get(&self, strike: Price) -> Option<&StrikeLegs> {
        self.legs.get(&strike)
    }

    /// Strikes with at least one resolved leg, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (&Price, &StrikeLegs)> {
        self.legs.iter()
    }

    /// CALL legs by ascending strike, then PUT legs by ascending strike.
    pub fn instrument_keys(&self) -> Vec<InstrumentKey> {
        OptionType::BOTH
            .iter()
            .flat_map(|ot| self.legs.values().filter_map(move |legs| legs.leg(*ot)))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

/// A strike window together with its resolved instruments.
///
/// Published as a whole; consumers never see a window paired with another
/// window's tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainWindow {
    pub window: StrikeWindow,
    pub tokens: TokenMap,
}
