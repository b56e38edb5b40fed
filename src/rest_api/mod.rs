//! HTTP endpoints for probes and scraping
//!
//! Serves `/health` for liveness checks and `/metrics` in OpenMetrics text.

mod server;

pub use server::{router, run_server};
