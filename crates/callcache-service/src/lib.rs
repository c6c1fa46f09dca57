//! A read-through cache for single request/response remote calls.
//!
//! See the [`caching`] module for how calls are keyed, coalesced, and persisted.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod logging;
pub mod utils;
