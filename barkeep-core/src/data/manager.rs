//! Cache orchestrator: decides between the local store and the remote provider.
//!
//! Two retrieval modes:
//! - **Range retrieval** (backtests, optimization): serve from the store when its
//!   span covers the request within tolerance; otherwise fetch the requested
//!   range, replace the stored file with it, and return what was fetched.
//! - **Recent retrieval** (live execution): always fetch, never read or write the
//!   store, window = lookback + buffer days ending now.
//!
//! Range retrieval state machine:
//! `exists? → read → coverage → {HIT: serve filtered stored bars | MISS: fetch →
//! {empty: serve empty | non-empty: persist → serve fetched}}`.
//! A store read failure is a MISS. Fetch failures propagate; nothing retries here.

use super::alpaca::AlpacaProvider;
use super::canonicalize::canonicalize;
use super::circuit_breaker::CircuitBreaker;
use super::coverage::{default_tolerance, has_coverage, Coverage, MissReason};
use super::provider::{DataProvider, FetchError, FetchRequest};
use super::store::{BarStore, ParquetStore, StoreError};
use crate::config::{AppConfig, DEFAULT_LOOKBACK_BUFFER_DAYS};
use crate::domain::{
    validate_ticker, BarSeries, Granularity, IntoUtc, RequestError, SeriesRequest, TimeSpan,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("fetch failed for {ticker}: {source}")]
    Fetch { ticker: String, source: FetchError },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(
        "remote data client not initialized: call DataManager::init_provider \
         (or set ALPACA_API_KEY and ALPACA_SECRET_KEY) before fetching"
    )]
    ProviderNotInitialized,

    #[error("provider setup failed: {0}")]
    ProviderSetup(FetchError),
}

/// Which path a range retrieval took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalOutcome {
    /// Served from the store, no network access.
    CacheHit,
    /// Fetched remotely and written to the store.
    FetchedAndStored,
    /// Provider had nothing for the range; nothing stored.
    FetchedEmpty,
}

impl fmt::Display for RetrievalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RetrievalOutcome::CacheHit => "cache hit",
            RetrievalOutcome::FetchedAndStored => "fetched and stored",
            RetrievalOutcome::FetchedEmpty => "no data",
        })
    }
}

/// Bars plus the path that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub bars: BarSeries,
    pub outcome: RetrievalOutcome,
}

/// Cache report for one (ticker, granularity).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub ticker: String,
    pub granularity: Granularity,
    pub cached: bool,
    pub readable: bool,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub bar_count: usize,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The cache orchestrator.
pub struct DataManager {
    store: Box<dyn BarStore>,
    provider: Option<Box<dyn DataProvider>>,
    tolerance: Duration,
    lookback_buffer_days: u32,
    clock: Clock,
}

impl DataManager {
    /// Orchestrator over a store with no provider installed yet.
    pub fn new(store: impl BarStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            provider: None,
            tolerance: default_tolerance(),
            lookback_buffer_days: DEFAULT_LOOKBACK_BUFFER_DAYS,
            clock: Box::new(Utc::now),
        }
    }

    /// Build from configuration. The Alpaca provider is installed only when
    /// credentials are present in the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self, DataError> {
        let store = ParquetStore::new(&config.data.daily_path, &config.data.minute_path);
        let mut manager = Self::new(store)
            .with_tolerance(config.data.tolerance())
            .with_lookback_buffer_days(config.live.lookback_buffer_days);

        match config.credentials() {
            Some(credentials) => {
                let breaker = Arc::new(CircuitBreaker::default_provider());
                let provider = AlpacaProvider::new(credentials, &config.provider, breaker)
                    .map_err(DataError::ProviderSetup)?;
                manager.init_provider(provider);
            }
            None => debug!("no provider credentials in environment; remote fetch disabled"),
        }
        Ok(manager)
    }

    pub fn with_provider(mut self, provider: impl DataProvider + 'static) -> Self {
        self.init_provider(provider);
        self
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_lookback_buffer_days(mut self, days: u32) -> Self {
        self.lookback_buffer_days = days;
        self
    }

    /// Replace the wall clock used by recent retrieval.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Install the remote provider. Must happen before any fetch.
    pub fn init_provider(&mut self, provider: impl DataProvider + 'static) {
        info!(provider = provider.name(), "remote data provider initialized");
        self.provider = Some(Box::new(provider));
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Range retrieval returning only the bars.
    pub fn retrieve_for_range(
        &self,
        ticker: &str,
        granularity: Granularity,
        start: impl IntoUtc,
        end: impl IntoUtc,
    ) -> Result<BarSeries, DataError> {
        let req = SeriesRequest::new(ticker, granularity, start, end)?;
        Ok(self.retrieve(&req)?.bars)
    }

    /// Range retrieval, reporting which path was taken.
    pub fn retrieve(&self, req: &SeriesRequest) -> Result<Retrieval, DataError> {
        let (coverage, stored) = self.lookup(req);

        match (coverage, stored) {
            (Coverage::Hit, Some(stored)) => {
                info!(ticker = %req.ticker, granularity = %req.granularity, "using cached data");
                let bars = stored.between(req.start, req.end);
                return Ok(Retrieval {
                    bars,
                    outcome: RetrievalOutcome::CacheHit,
                });
            }
            (Coverage::Miss(MissReason::NotCached), _) => {
                info!(ticker = %req.ticker, granularity = %req.granularity, "no cached data, fetching");
            }
            (Coverage::Miss(reason), _) => {
                info!(
                    ticker = %req.ticker,
                    granularity = %req.granularity,
                    %reason,
                    "cached data insufficient, fetching"
                );
            }
            (Coverage::Hit, None) => {}
        }

        let fetched = self.fetch(req.ticker.as_str(), req.granularity, req.span())?;
        if fetched.is_empty() {
            warn!(ticker = %req.ticker, granularity = %req.granularity, "provider returned no data");
            return Ok(Retrieval {
                bars: fetched,
                outcome: RetrievalOutcome::FetchedEmpty,
            });
        }

        self.store.write(&req.ticker, req.granularity, &fetched)?;
        info!(
            ticker = %req.ticker,
            granularity = %req.granularity,
            bars = fetched.len(),
            "cached fetched data"
        );
        Ok(Retrieval {
            bars: fetched,
            outcome: RetrievalOutcome::FetchedAndStored,
        })
    }

    /// Coverage of the stored series for a request. Never fails: unreadable files are a miss.
    pub fn check_coverage(&self, req: &SeriesRequest) -> Coverage {
        self.lookup(req).0
    }

    /// Coverage decision plus the stored series when it was readable.
    fn lookup(&self, req: &SeriesRequest) -> (Coverage, Option<BarSeries>) {
        if !self.store.exists(&req.ticker, req.granularity) {
            return (Coverage::Miss(MissReason::NotCached), None);
        }
        match self.store.read(&req.ticker, req.granularity) {
            Ok(stored) => {
                let coverage = has_coverage(stored.span(), req.span(), self.tolerance);
                (coverage, Some(stored))
            }
            Err(e) => {
                warn!(ticker = %req.ticker, granularity = %req.granularity, error = %e, "error checking cached data");
                (Coverage::Miss(MissReason::Unreadable), None)
            }
        }
    }

    /// Recent retrieval for live execution: daily bars over
    /// `[now - (lookback_days + buffer) days, now]`, fetched fresh and never stored.
    pub fn retrieve_recent(&self, ticker: &str, lookback_days: u32) -> Result<BarSeries, DataError> {
        let ticker = validate_ticker(ticker)?;
        let end = (self.clock)();
        let start = end - Duration::days(i64::from(lookback_days) + i64::from(self.lookback_buffer_days));

        info!(%ticker, lookback_days, "fetching live data");
        self.fetch(&ticker, Granularity::Daily, TimeSpan::new(start, end))
    }

    /// Fetch and canonicalize; no store access.
    fn fetch(
        &self,
        ticker: &str,
        granularity: Granularity,
        span: TimeSpan,
    ) -> Result<BarSeries, DataError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(DataError::ProviderNotInitialized)?;

        let req = FetchRequest {
            ticker: ticker.to_string(),
            granularity,
            start: span.start,
            end: span.end,
        };
        debug!(provider = provider.name(), %ticker, %granularity, start = %span.start, end = %span.end, "fetching bars");

        let raw = provider.fetch(&req).map_err(|source| DataError::Fetch {
            ticker: ticker.to_string(),
            source,
        })?;

        let (series, report) = canonicalize(raw.into_bars(), span);
        if report.total_dropped() > 0 {
            warn!(
                %ticker,
                duplicates = report.duplicates,
                out_of_range = report.out_of_range,
                insane = report.insane,
                "dropped malformed bars from provider response"
            );
        }
        Ok(series)
    }

    /// Cache report per ticker and granularity. With no tickers, reports every stored file.
    pub fn status(&self, tickers: &[String]) -> Result<Vec<CacheStatus>, DataError> {
        let mut report = Vec::new();
        for granularity in Granularity::ALL {
            let listed;
            let names: &[String] = if tickers.is_empty() {
                listed = self.store.list(granularity)?;
                &listed
            } else {
                tickers
            };

            for ticker in names {
                report.push(self.status_of(ticker, granularity));
            }
        }
        Ok(report)
    }

    fn status_of(&self, ticker: &str, granularity: Granularity) -> CacheStatus {
        let mut status = CacheStatus {
            ticker: ticker.to_string(),
            granularity,
            cached: self.store.exists(ticker, granularity),
            readable: false,
            start: None,
            end: None,
            bar_count: 0,
        };
        if status.cached {
            if let Ok(series) = self.store.read(ticker, granularity) {
                let span = series.span();
                status.readable = true;
                status.start = span.map(|s| s.start);
                status.end = span.map(|s| s.end);
                status.bar_count = series.len();
            }
        }
        status
    }
}
