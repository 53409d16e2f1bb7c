//!
//! Utility module for the wallet kit.
//!
//! Fixed-precision token amounts and EOSIO asset strings (`"1.0000 EOS"`).
/// Fixed-precision amounts and assets
pub mod amount;

pub use amount::{Amount, AmountParseError, Asset};
