//! Core domain types for the option-chain streamer.
//!
//! This crate provides the types shared by every other crate:
//! - `InstrumentKey`: `"<EXCHANGE>|<TOKEN>"` identifier used on the wire and in stores
//! - `Price`: precision-safe strike and quote arithmetic
//! - `Tick`: latest raw field values for one instrument, merged from partial updates
//! - `Exchange`, `OptionType`: small vocabulary enums

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod tick;

pub use decimal::Price;
pub use error::{CoreError, Result};
pub use instrument::{Exchange, InstrumentKey, OptionType};
pub use tick::{parse_numeric, Tick};
