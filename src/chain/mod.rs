//! Chain client integration for EOSIO nodes
//!
//! This module defines the `ChainClient` seam the sync managers and the transaction manager talk
//! to, together with an HTTP implementation against the standard `/v1/chain` and `/v1/history`
//! endpoints. Signing and ABI packing stay outside this crate behind `TransactionSigner`.

/// HTTP client and the `ChainClient` / `TransactionSigner` traits
mod client;
/// Wire types and chain errors
mod types;

pub use client::{ChainClient, HttpChainClient, TransactionSigner};
pub use types::*;
