//! Reliability and shared-state infrastructure for repo-oracle.
//!
//! - [`store`]: key/value store abstraction (Redis or in-memory)
//! - [`rate_limiter`]: distributed, fail-open per-client quota
//! - [`context_cache`]: distributed tier holding precomputed repository contexts
//! - [`retry`]: bounded exponential backoff for transient upstream errors
//! - [`shutdown`]: cooperative shutdown signal for the daemon

pub mod context_cache;
pub mod rate_limiter;
pub mod retry;
pub mod shutdown;
pub mod store;
