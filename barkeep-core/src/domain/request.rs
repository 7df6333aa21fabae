//! Validated retrieval request.

use super::bar::{Granularity, TimeSpan};
use super::time::IntoUtc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("ticker must not be empty")]
    EmptyTicker,

    #[error("ticker '{0}' contains characters that cannot name a store file")]
    BadTicker(String),

    #[error("start {start} is after end {end}")]
    InvertedRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// One (ticker, granularity, start, end) request with UTC endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub ticker: String,
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SeriesRequest {
    /// Build a request, normalizing both instants to UTC.
    pub fn new(
        ticker: &str,
        granularity: Granularity,
        start: impl IntoUtc,
        end: impl IntoUtc,
    ) -> Result<Self, RequestError> {
        let ticker = validate_ticker(ticker)?;
        let start = start.into_utc();
        let end = end.into_utc();
        if start > end {
            return Err(RequestError::InvertedRange { start, end });
        }
        Ok(Self {
            ticker,
            granularity,
            start,
            end,
        })
    }

    pub fn span(&self) -> TimeSpan {
        TimeSpan::new(self.start, self.end)
    }
}

/// Trim a ticker and reject values that are empty or would escape the store directory.
pub fn validate_ticker(ticker: &str) -> Result<String, RequestError> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(RequestError::EmptyTicker);
    }
    if ticker.contains(['/', '\\']) || ticker.starts_with('.') {
        return Err(RequestError::BadTicker(ticker.to_string()));
    }
    Ok(ticker.to_string())
}
