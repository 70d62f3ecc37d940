//! Undertow Web - JSON API Server

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! Exposes server listing and embed-source resolution over HTTP with status
//! mapping, request tracing and a per-client rate limit.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod server;

// Re-export main types
pub use error::{ApiError, WebError};
pub use server::{AppState, build_router, run_server};
