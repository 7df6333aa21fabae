//! Barkeep Core: historical bar retrieval with a coverage-tolerant local cache.
//!
//! - Domain types (bars, series, granularity, requests, UTC normalization)
//! - Parquet bar store with atomic replace-on-write
//! - Remote provider trait and the Alpaca market-data client
//! - Cache orchestrator: cache-first range retrieval and always-fresh recent retrieval
//! - Order model and the strategy capability interface consumed by runners

pub mod config;
pub mod data;
pub mod domain;
pub mod orders;
pub mod strategy;
