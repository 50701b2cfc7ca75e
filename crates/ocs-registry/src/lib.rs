//! Symbol master and option contract resolution.
//!
//! Resolves `(symbol, expiry, strike, option type)` to exchange tokens and
//! supplies per-symbol contract parameters (strike spacing, nearest expiry,
//! exchange, lot size) from the broker's symbol master.

pub mod error;
pub mod loader;
pub mod resolver;
pub mod symbol_master;

pub use error::{RegistryError, RegistryResult};
pub use loader::{check_freshness, LoaderConfig, SymbolMasterLoader};
pub use resolver::{DynSymbolResolver, SymbolResolver};
pub use symbol_master::{ScripRecord, SymbolMaster};
