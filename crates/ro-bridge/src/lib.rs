//! Bridge layer exposing repo-oracle over HTTP.
//!
//! Key modules:
//! - [`orchestrator`]: quota gate, context assembly and generation for a query
//! - [`http_api`]: Axum-based REST API
//! - [`api_error`]: JSON error responses
//! - [`client_ip`]: caller identity for quota accounting

pub mod api_error;
pub mod client_ip;
pub mod http_api;
pub mod orchestrator;
