//! HTTP API
//!
//! axum router over `ShieldService`.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod stats;
pub mod types;

pub use server::{create_router, start_server};
pub use stats::{RequestStats, StatsReport};
pub use types::{ApiResponse, ALREADY_INSERTED};
