//! HTTP API server for the Terrapin provider mirror.
//!
//! This crate provides the client-facing surface:
//! - The provider network mirror protocol (version index, version
//!   detail, archive download)
//! - The manual metadata sync endpoint
//! - Health probes and Prometheus metrics

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
