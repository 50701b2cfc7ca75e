//! Symbol resolution seam used by the strike-window tracker.

use crate::error::RegistryResult;
use chrono::NaiveDate;
use ocs_core::{Exchange, OptionType, Price};
use std::sync::Arc;

/// Resolves option contracts and per-symbol contract parameters.
pub trait SymbolResolver: Send + Sync {
    /// Token of the option contract `(symbol, expiry, strike, option_type)`.
    fn resolve_token(
        &self,
        symbol: &str,
        strike: Price,
        option_type: OptionType,
        expiry: NaiveDate,
    ) -> RegistryResult<String>;

    /// Distance between adjacent listed strikes.
    fn strike_spacing(&self, symbol: &str) -> RegistryResult<Price>;

    /// Exchange the symbol's option contracts trade on.
    fn exchange(&self, symbol: &str) -> RegistryResult<Exchange>;

    /// Earliest option expiry on or after today.
    fn nearest_expiry(&self, symbol: &str) -> RegistryResult<NaiveDate>;
}

/// Arc wrapper for SymbolResolver trait objects.
pub type DynSymbolResolver = Arc<dyn SymbolResolver>;
