//! # taskline-api
//!
//! HTTP composition layer for the Taskline sync backend.
//!
//! This crate provides the API surface for Taskline, handling:
//!
//! - **Authentication**: Bearer-token user identification
//! - **Routing**: Sync push/pull endpoint configuration
//! - **Service Wiring**: Composition of the sync engine and its stores
//! - **Observability**: Metrics, tracing, and health checks
//!
//! ## Design Principles
//!
//! This crate is a **thin composition layer** with no domain policy.
//! All sync semantics live in `taskline-sync`.
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health        - Health check
//! GET  /ready         - Readiness check
//! GET  /metrics       - Prometheus metrics
//! GET  /openapi.json  - OpenAPI document
//! POST /sync/push     - Apply a batch of client mutations
//! GET  /sync/pull     - Page through the change stream
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use taskline_api::config::Config;
//! use taskline_api::server::Server;
//!
//! let server = Server::new(Config::from_env()?);
//! server.serve().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod openapi;
pub mod routes;
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::RequestContext;
    pub use crate::error::{ApiError, ApiResult};
    pub use crate::server::Server;
}
