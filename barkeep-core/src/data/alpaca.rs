//! Alpaca market-data provider.
//!
//! Fetches stock bars from the v2 bars endpoint
//! (`GET {data_url}/v2/stocks/{symbol}/bars`), following `next_page_token`
//! until the range is exhausted. Handles authentication headers, retries with
//! exponential backoff, and the shared circuit breaker.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataProvider, FetchError, FetchRequest};
use crate::config::{Credentials, ProviderConfig};
use crate::domain::{Bar, BarSeries, Granularity};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum bars per page accepted by the endpoint.
const PAGE_LIMIT: u32 = 10_000;

/// One page of the bars response.
#[derive(Debug, Deserialize)]
struct BarsPage {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl From<AlpacaBar> for Bar {
    fn from(b: AlpacaBar) -> Self {
        Bar {
            timestamp: b.t,
            open: b.o,
            high: b.h,
            low: b.l,
            close: b.c,
            volume: b.v.max(0.0).round() as u64,
        }
    }
}

/// Provider timeframe for a granularity.
pub fn timeframe(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Daily => "1Day",
        Granularity::Minute => "1Min",
    }
}

/// Alpaca market-data provider.
pub struct AlpacaProvider {
    client: reqwest::blocking::Client,
    credentials: Credentials,
    data_url: String,
    feed: Option<String>,
    adjustment: Option<String>,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl AlpacaProvider {
    pub fn new(
        credentials: Credentials,
        config: &ProviderConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            data_url: config.data_url.trim_end_matches('/').to_string(),
            feed: config.feed.clone(),
            adjustment: config.adjustment.clone(),
            circuit_breaker,
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Bars endpoint for a symbol.
    fn bars_url(&self, symbol: &str) -> String {
        format!("{}/v2/stocks/{symbol}/bars", self.data_url)
    }

    /// Query string for one page of a request.
    fn query(&self, req: &FetchRequest, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("timeframe", timeframe(req.granularity).to_string()),
            ("start", req.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", req.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(feed) = &self.feed {
            params.push(("feed", feed.clone()));
        }
        if let Some(adjustment) = &self.adjustment {
            params.push(("adjustment", adjustment.clone()));
        }
        if let Some(token) = page_token {
            params.push(("page_token", token.to_string()));
        }
        params
    }

    /// Parse one response body, keeping only bars for the requested symbol.
    fn parse_page(symbol: &str, body: &str) -> Result<(Vec<Bar>, Option<String>), FetchError> {
        let page: BarsPage = serde_json::from_str(body).map_err(|e| {
            FetchError::ResponseFormatChanged(format!("failed to parse bars for {symbol}: {e}"))
        })?;

        if let Some(returned) = page.symbol.as_deref() {
            if !returned.eq_ignore_ascii_case(symbol) {
                return Err(FetchError::ResponseFormatChanged(format!(
                    "asked for {symbol}, provider answered for {returned}"
                )));
            }
        }

        let bars = page
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(Bar::from)
            .collect();
        let next = page.next_page_token.filter(|t| !t.is_empty());
        Ok((bars, next))
    }

    /// Fetch one page with retry and circuit breaker logic.
    fn fetch_page(
        &self,
        req: &FetchRequest,
        page_token: Option<&str>,
    ) -> Result<(Vec<Bar>, Option<String>), FetchError> {
        let url = self.bars_url(&req.ticker);
        let query = self.query(req, page_token);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(ticker = %req.ticker, attempt, ?delay, "retrying bars request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(FetchError::CircuitBreakerTripped);
            }

            let sent = self
                .client
                .get(&url)
                .query(&query)
                .header("APCA-API-KEY-ID", &self.credentials.api_key)
                .header("APCA-API-SECRET-KEY", &self.credentials.secret_key)
                .send();

            let resp = match sent {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(FetchError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(FetchError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();

            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(FetchError::AuthenticationRequired(format!(
                    "access forbidden for {} (check API keys and data subscription)",
                    req.ticker
                )));
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(FetchError::AuthenticationRequired(
                    "API key or secret rejected".into(),
                ));
            }

            if status == reqwest::StatusCode::NOT_FOUND {
                self.circuit_breaker.record_success();
                return Ok((Vec::new(), None));
            }

            if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
                let body = resp.text().unwrap_or_default();
                return Err(FetchError::InvalidRequest(format!("{}: {body}", req.ticker)));
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(ticker = %req.ticker, retry_after, "rate limited by provider");
                last_error = Some(FetchError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(FetchError::Other(format!("HTTP {status} for {}", req.ticker)));
                continue;
            }

            let body = resp
                .text()
                .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;
            let page = Self::parse_page(&req.ticker, &body)?;
            self.circuit_breaker.record_success();
            return Ok(page);
        }

        Err(last_error.unwrap_or_else(|| FetchError::Other("max retries exceeded".into())))
    }
}

impl DataProvider for AlpacaProvider {
    fn name(&self) -> &str {
        "alpaca"
    }

    fn fetch(&self, req: &FetchRequest) -> Result<BarSeries, FetchError> {
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let (page, next) = self.fetch_page(req, page_token.as_deref())?;
            bars.extend(page);
            match next {
                Some(token) if page_token.as_deref() == Some(token.as_str()) => {
                    return Err(FetchError::ResponseFormatChanged(format!(
                        "pagination for {} repeated token {token}",
                        req.ticker
                    )));
                }
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(
            ticker = %req.ticker,
            granularity = %req.granularity,
            bars = bars.len(),
            "fetched bars from alpaca"
        );
        Ok(BarSeries::from_bars(bars))
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn provider(config: ProviderConfig) -> AlpacaProvider {
        AlpacaProvider::new(
            Credentials {
                api_key: "key".into(),
                secret_key: "secret".into(),
            },
            &config,
            Arc::new(CircuitBreaker::default_provider()),
        )
        .unwrap()
    }

    fn request() -> FetchRequest {
        FetchRequest {
            ticker: "SPY".into(),
            granularity: Granularity::Daily,
            start: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn url_and_query_for_daily_request() {
        let p = provider(ProviderConfig {
            data_url: "https://data.example.test/".into(),
            feed: Some("iex".into()),
            ..ProviderConfig::default()
        });
        assert_eq!(p.bars_url("SPY"), "https://data.example.test/v2/stocks/SPY/bars");

        let query = p.query(&request(), Some("abc"));
        assert!(query.contains(&("timeframe", "1Day".to_string())));
        assert!(query.contains(&("start", "2023-01-01T00:00:00Z".to_string())));
        assert!(query.contains(&("end", "2023-06-01T00:00:00Z".to_string())));
        assert!(query.contains(&("feed", "iex".to_string())));
        assert!(query.contains(&("page_token", "abc".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "adjustment"));
    }

    #[test]
    fn minute_timeframe() {
        assert_eq!(timeframe(Granularity::Minute), "1Min");
    }

    #[test]
    fn parses_page_with_next_token() {
        let body = r#"{
            "bars": [
                {"t":"2023-01-03T05:00:00Z","o":384.37,"h":386.43,"l":377.83,"c":380.82,"v":74850731,"n":583554,"vw":380.97},
                {"t":"2023-01-04T05:00:00Z","o":383.18,"h":385.88,"l":380.0,"c":383.76,"v":85934098,"n":630210,"vw":383.33}
            ],
            "symbol": "SPY",
            "next_page_token": "U1BZfDIwMjMtMDEtMDQ="
        }"#;

        let (bars, next) = AlpacaProvider::parse_page("SPY", body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].timestamp,
            Utc.with_ymd_and_hms(2023, 1, 3, 5, 0, 0).unwrap()
        );
        assert_eq!(bars[0].volume, 74_850_731);
        assert_eq!(bars[1].close, 383.76);
        assert_eq!(next.as_deref(), Some("U1BZfDIwMjMtMDEtMDQ="));
    }

    #[test]
    fn null_bars_is_an_empty_page() {
        let body = r#"{"bars": null, "symbol": "ZZZZ", "next_page_token": null}"#;
        let (bars, next) = AlpacaProvider::parse_page("ZZZZ", body).unwrap();
        assert!(bars.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn foreign_symbol_is_rejected() {
        let body = r#"{"bars": [], "symbol": "QQQ", "next_page_token": null}"#;
        assert!(matches!(
            AlpacaProvider::parse_page("SPY", body),
            Err(FetchError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn garbage_body_is_format_error() {
        assert!(matches!(
            AlpacaProvider::parse_page("SPY", "<html>gateway timeout</html>"),
            Err(FetchError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn open_breaker_refuses_without_network() {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        breaker.trip();
        let p = AlpacaProvider::new(
            Credentials {
                api_key: "key".into(),
                secret_key: "secret".into(),
            },
            &ProviderConfig::default(),
            breaker,
        )
        .unwrap();

        assert!(!p.is_available());
        assert!(matches!(
            p.fetch(&request()),
            Err(FetchError::CircuitBreakerTripped)
        ));
    }
}
