//! Wallet Synchronization Module
//!
//! This module keeps an account's registered tokens in step with the chain. It is composed of
//! several submodules, each responsible for one aspect of the sync process:
//!
//! - `orchestrator`: The public facade. Owns the token registry, dispatches syncs, applies their
//!   results and republishes them as notifications.
//! - `events`: Events emitted by the managers and notifications published to subscribers.
//! - `balance_sync`: Fetches and caches one token's balance.
//! - `action_sync`: Pages through new account actions and tracks the irreversible block.
//! - `progress_tracker`: Cursor and page accounting for one action sync pass.
//!
//! Managers run on spawned tasks and never write token state themselves; they report through an
//! `EventSink` that the orchestrator drains on a single event loop.

/// Action history synchronization
pub mod action_sync;
/// Per-token balance synchronization
pub mod balance_sync;
/// Event system for decoupled communication during sync
pub mod events;
/// Main coordinator for the wallet sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
mod retry;

pub use orchestrator::*;
