//! Observability for repo-oracle services.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`,
//!   selected by `general.log_format`
//! - **Request IDs**: Axum middleware that propagates or mints `X-Request-Id`
//!   and wraps each request in a tracing span

pub mod logging;
pub mod tracing_setup;
