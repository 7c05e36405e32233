//! In-process memoization of remote lookups.
//!
//! This module provides the `ApiCallCache` used by the gallery client to
//! avoid repeating single-entity lookups. Entries are bounded per endpoint
//! by an LRU policy and never go stale within the process.

pub mod memo;

pub use memo::{ApiCallCache, CallArgs, DEFAULT_CAPACITY};
