//! Data provider trait and fetch error types.
//!
//! The DataProvider trait abstracts over market-data sources so the cache
//! orchestrator can be driven by the Alpaca client in production and by an
//! in-memory mock in tests.

use crate::domain::{BarSeries, Granularity};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by a remote provider.
///
/// These are displayable in CLI context and are always propagated to the caller
/// of a retrieval; the orchestrator never retries them.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication rejected: {0}")]
    AuthenticationRequired(String),

    #[error("request rejected by provider: {0}")]
    InvalidRequest(String),

    #[error("hard stop: data provider is refusing requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider error: {0}")]
    Other(String),
}

/// What a provider is asked for: one ticker, one sampling unit, one closed range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticker: String,
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Trait for remote bar providers.
///
/// Implementations own request construction for their source. They return bars
/// for exactly the requested ticker, ascending by timestamp, and an empty series
/// (not an error) when the source has nothing for the range. Providers don't
/// know about the local store.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch OHLCV bars for one ticker over `[start, end]`.
    fn fetch(&self, req: &FetchRequest) -> Result<BarSeries, FetchError>;

    /// Check if the provider is currently accepting requests.
    fn is_available(&self) -> bool {
        true
    }
}
