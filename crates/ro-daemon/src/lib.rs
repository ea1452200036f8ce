//! repo-oracle daemon: wires configuration, stores, the GitHub client and the
//! AI providers into the HTTP API and serves it until shutdown.

pub mod daemon;
