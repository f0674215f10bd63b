//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB, a local JSON folder and an HTTP endpoint as storage destinations
//! - Telegram Bot API (or the log) as the progress channel
//! - Demo scraper and no-op browser for running without a site automation engine

pub mod demo;
pub mod duckdb;
pub mod json;
pub mod registry;
pub mod telegram;
pub mod web_post;

#[cfg(test)]
pub mod mock_http;
