//! AccountFlow Backend Library
//!
//! Exposes the ingestion core (versioned update index, leaderboard tracker,
//! debounce scheduler), the mock event feed and the REST surface for use by
//! the binary and the integration tests.

pub mod api;
pub mod feed;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod ranked;
