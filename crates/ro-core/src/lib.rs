//! Shared domain types, configuration, clock abstraction and the
//! single-flight fetch cache used across repo-oracle crates.

pub mod cache;
pub mod clock;
pub mod config;
pub mod types;
