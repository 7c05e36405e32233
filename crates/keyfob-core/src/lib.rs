//! keyfob core library.
//!
//! Keeps a remote service's OAuth tokens alive across runs: cached tokens are
//! reused while valid, refreshed when stale, and replaced through a password
//! login with operator-provisioned credentials as a last resort.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod secrets;
pub mod utils;
