//! Remote repository integrations: the GitHub client, the bounded tree
//! fetcher and the whole-repository context collector.

pub mod github;
pub mod types;
