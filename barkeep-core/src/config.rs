//! Application configuration.
//!
//! One `AppConfig` is built at process start (`AppConfig::load`) and handed by
//! reference to whatever needs it. Every section has defaults, so an empty TOML
//! document is a valid configuration. API credentials are never read from the
//! file; they come from `ALPACA_API_KEY` / `ALPACA_SECRET_KEY`.

use crate::data::coverage::DEFAULT_TOLERANCE_DAYS;
use crate::domain::Granularity;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const API_KEY_VAR: &str = "ALPACA_API_KEY";
pub const SECRET_KEY_VAR: &str = "ALPACA_SECRET_KEY";

/// Extra calendar days added to a live lookback window to absorb weekends and holidays.
pub const DEFAULT_LOOKBACK_BUFFER_DAYS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Local store locations and cache policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub daily_path: PathBuf,
    pub minute_path: PathBuf,
    /// Coverage tolerance at each edge of a request, in days.
    pub tolerance_days: i64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            daily_path: PathBuf::from("data/daily"),
            minute_path: PathBuf::from("data/minute"),
            tolerance_days: DEFAULT_TOLERANCE_DAYS,
        }
    }
}

impl DataConfig {
    pub fn tolerance(&self) -> Duration {
        Duration::days(self.tolerance_days)
    }
}

/// Remote market-data endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub data_url: String,
    /// Data feed (`iex`, `sip`); provider default when unset.
    pub feed: Option<String>,
    /// Corporate-action adjustment (`raw`, `split`, `dividend`, `all`).
    pub adjustment: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            data_url: "https://data.alpaca.markets".into(),
            feed: None,
            adjustment: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Defaults for backtest/optimization retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Registry key of the active strategy.
    pub strategy: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub granularity: Granularity,
    pub tickers: Vec<String>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            strategy: Some("sma_crossover".into()),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2023, 6, 1),
            granularity: Granularity::Daily,
            tickers: vec!["SPY".into()],
        }
    }
}

/// Defaults for live retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub lookback_buffer_days: u32,
    /// Overrides the strategy lookback when set.
    pub lookback_days: Option<u32>,
    pub tickers: Vec<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            lookback_buffer_days: DEFAULT_LOOKBACK_BUFFER_DAYS,
            lookback_days: None,
            tickers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub provider: ProviderConfig,
    pub backtest: BacktestConfig,
    pub live: LiveConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `config.toml` in the working
    /// directory is used when present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if !path.exists() => Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.tolerance_days < 0 {
            return Err(ConfigError::Invalid(
                "data.tolerance_days must not be negative".into(),
            ));
        }
        if let (Some(start), Some(end)) = (self.backtest.start_date, self.backtest.end_date) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "backtest.start_date {start} is after backtest.end_date {end}"
                )));
            }
        }
        if self.provider.data_url.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.data_url is empty".into()));
        }
        Ok(())
    }

    /// Credentials from the process environment.
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_lookup(|key| std::env::var(key).ok())
    }
}

/// API key pair for the market-data provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl Credentials {
    /// Build from a variable lookup; `None` unless both values are present and non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = lookup(API_KEY_VAR).filter(|v| !v.trim().is_empty())?;
        let secret_key = lookup(SECRET_KEY_VAR).filter(|v| !v.trim().is_empty())?;
        Some(Self {
            api_key,
            secret_key,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.data.tolerance(), Duration::days(5));
        assert_eq!(config.live.lookback_buffer_days, 10);
    }

    #[test]
    fn backtest_section_defaults_to_a_runnable_request() {
        let backtest = AppConfig::from_toml("").unwrap().backtest;
        assert_eq!(backtest.strategy.as_deref(), Some("sma_crossover"));
        assert_eq!(backtest.start_date, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(backtest.end_date, NaiveDate::from_ymd_opt(2023, 6, 1));
        assert_eq!(backtest.granularity, Granularity::Daily);
        assert_eq!(backtest.tickers, vec!["SPY"]);
        // live tickers fall back to the strategy's own list
        assert!(AppConfig::default().live.tickers.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let config = AppConfig::from_toml(
            r#"
[data]
daily_path = "cache/daily"
minute_path = "cache/minute"
tolerance_days = 3

[provider]
feed = "iex"
max_retries = 1

[backtest]
strategy = "sma_crossover"
start_date = "2023-01-01"
end_date = "2023-06-01"
granularity = "minute"
tickers = ["SPY", "QQQ"]

[live]
lookback_days = 60
tickers = ["AAPL"]
"#,
        )
        .unwrap();

        assert_eq!(config.data.daily_path, PathBuf::from("cache/daily"));
        assert_eq!(config.data.tolerance_days, 3);
        assert_eq!(config.provider.feed.as_deref(), Some("iex"));
        assert_eq!(config.provider.timeout_secs, 30);
        assert_eq!(config.backtest.granularity, Granularity::Minute);
        assert_eq!(
            config.backtest.start_date,
            NaiveDate::from_ymd_opt(2023, 1, 1)
        );
        assert_eq!(config.backtest.tickers, vec!["SPY", "QQQ"]);
        assert_eq!(config.live.lookback_days, Some(60));
    }

    #[test]
    fn inverted_backtest_dates_are_rejected() {
        let err = AppConfig::from_toml(
            r#"
[backtest]
start_date = "2023-06-01"
end_date = "2023-01-01"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/barkeep.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[data]\ntolerance_days = 7\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.data.tolerance_days, 7);
    }

    #[test]
    fn credentials_need_both_keys() {
        let mut env = HashMap::new();
        env.insert(API_KEY_VAR, "key".to_string());
        assert!(Credentials::from_lookup(|k| env.get(k).cloned()).is_none());

        env.insert(SECRET_KEY_VAR, "secret".to_string());
        let creds = Credentials::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(creds.api_key, "key");
        let printed = format!("{creds:?}");
        assert!(!printed.contains("\"key\""));
        assert!(!printed.contains("\"secret\""));
    }
}
