//! Barkeep CLI: historical bar retrieval with a local Parquet cache.
//!
//! Commands:
//! - `fetch`: cache-first retrieval for backtests; persists on miss
//! - `live`: fresh retrieval of recent daily bars; never touches the cache
//! - `cache status`: what is stored, per ticker and granularity

mod log;

use anyhow::{bail, Context, Result};
use barkeep_core::config::AppConfig;
use barkeep_core::data::{CacheStatus, DataManager};
use barkeep_core::domain::{Granularity, SeriesRequest};
use barkeep_core::strategy::{StrategyProfile, StrategyRegistry};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Used when neither the command line nor the config names a strategy.
const DEFAULT_STRATEGY: &str = "sma_crossover";

#[derive(Parser)]
#[command(name = "barkeep", about = "Barkeep: historical bars with a local Parquet cache")]
struct Cli {
    /// Path to the TOML config file. Defaults to ./config.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve bars for a date range, serving from the cache when it covers the range.
    Fetch {
        /// Tickers (e.g., SPY QQQ). Defaults to [backtest].tickers, then the strategy's tickers.
        tickers: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to [backtest].start_date.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to [backtest].end_date.
        #[arg(long)]
        end: Option<String>,

        /// daily or minute. Defaults to [backtest].granularity.
        #[arg(long)]
        granularity: Option<Granularity>,
    },
    /// Fetch recent daily bars for live execution and report the strategy signal.
    Live {
        /// Tickers. Defaults to [live].tickers, then the strategy's tickers.
        tickers: Vec<String>,

        /// Days of history. Defaults to [live].lookback_days, then the strategy lookback.
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Registered strategy key. Defaults to [backtest].strategy.
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report stored span and bar count per ticker and granularity.
    Status {
        /// Tickers to report. Defaults to everything stored.
        tickers: Vec<String>,

        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    log::init_logging(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let registry = StrategyRegistry::with_defaults();

    match cli.command {
        Commands::Fetch {
            tickers,
            start,
            end,
            granularity,
        } => run_fetch(&config, &registry, tickers, start, end, granularity),
        Commands::Live {
            tickers,
            lookback_days,
            strategy,
        } => run_live(&config, &registry, tickers, lookback_days, strategy),
        Commands::Cache { action } => match action {
            CacheAction::Status { tickers, json } => run_cache_status(&config, &tickers, json),
        },
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{value}' (expected YYYY-MM-DD)"))
}

fn strategy_key(config: &AppConfig, cli_choice: Option<String>) -> String {
    cli_choice
        .or_else(|| config.backtest.strategy.clone())
        .unwrap_or_else(|| DEFAULT_STRATEGY.to_string())
}

/// First non-empty of: command line, config section, strategy profile.
fn resolve_tickers(
    cli: Vec<String>,
    configured: &[String],
    profile: &StrategyProfile,
) -> Result<Vec<String>> {
    let tickers = if !cli.is_empty() {
        cli
    } else if !configured.is_empty() {
        configured.to_vec()
    } else {
        profile.tickers.clone()
    };
    if tickers.is_empty() {
        bail!("no tickers given on the command line, in the config, or by the strategy");
    }
    Ok(tickers)
}

fn run_fetch(
    config: &AppConfig,
    registry: &StrategyRegistry,
    tickers: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    granularity: Option<Granularity>,
) -> Result<()> {
    let profile = registry.profile(&strategy_key(config, None))?;
    let tickers = resolve_tickers(tickers, &config.backtest.tickers, &profile)?;

    let start = match start {
        Some(s) => parse_date(&s)?,
        None => config
            .backtest
            .start_date
            .context("no start date: pass --start or set [backtest].start_date")?,
    };
    let end = match end {
        Some(s) => parse_date(&s)?,
        None => config
            .backtest
            .end_date
            .context("no end date: pass --end or set [backtest].end_date")?,
    };
    let granularity = granularity.unwrap_or(config.backtest.granularity);

    let manager = DataManager::from_config(config)?;
    let mut failed = 0;

    for ticker in &tickers {
        let retrieval = SeriesRequest::new(ticker, granularity, start, end)
            .map_err(anyhow::Error::from)
            .and_then(|req| manager.retrieve(&req).map_err(anyhow::Error::from));
        match retrieval {
            Ok(r) => println!("{:<8} {:<8} {:>7} bars  ({})", ticker, granularity, r.bars.len(), r.outcome),
            Err(e) => {
                failed += 1;
                error!(%ticker, error = %e, "skipping ticker");
            }
        }
    }

    if failed == tickers.len() {
        bail!("retrieval failed for every ticker");
    }
    Ok(())
}

fn run_live(
    config: &AppConfig,
    registry: &StrategyRegistry,
    tickers: Vec<String>,
    lookback_days: Option<u32>,
    strategy: Option<String>,
) -> Result<()> {
    let key = strategy_key(config, strategy);
    let profile = registry.profile(&key)?;
    let tickers = resolve_tickers(tickers, &config.live.tickers, &profile)?;

    let lookback = match lookback_days.or(config.live.lookback_days) {
        Some(days) => days,
        None => registry.max_lookback_days(std::slice::from_ref(&key))?,
    };
    info!(strategy = %key, lookback_days = lookback, tickers = tickers.len(), "live retrieval");

    let manager = DataManager::from_config(config)?;
    let mut failed = 0;

    for ticker in &tickers {
        match manager.retrieve_recent(ticker, lookback) {
            Ok(bars) => {
                let mut strategy = registry.create(&key)?;
                let signal = strategy.produce_signal(&bars);
                match bars.last() {
                    Some(last) => println!(
                        "{:<8} {:>5} bars  last {} close {:.2}  signal {:?}",
                        ticker,
                        bars.len(),
                        last.timestamp.date_naive(),
                        last.close,
                        signal
                    ),
                    None => {
                        warn!(%ticker, "no recent data");
                        println!("{ticker:<8}     0 bars");
                    }
                }
            }
            Err(e) => {
                failed += 1;
                error!(%ticker, error = %e, "live retrieval failed");
            }
        }
    }

    if failed == tickers.len() {
        bail!("live retrieval failed for every ticker");
    }
    Ok(())
}

fn run_cache_status(config: &AppConfig, tickers: &[String], json: bool) -> Result<()> {
    let manager = DataManager::from_config(config)?;
    let report = manager.status(tickers)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_empty() {
        println!(
            "Cache is empty: {} / {}",
            config.data.daily_path.display(),
            config.data.minute_path.display()
        );
        return Ok(());
    }

    println!("{:<8} {:<7} {:<25} {:>8}", "Ticker", "Unit", "Range", "Bars");
    println!("{}", "-".repeat(51));
    for row in &report {
        println!(
            "{:<8} {:<7} {:<25} {:>8}",
            row.ticker,
            row.granularity,
            describe_range(row),
            row.bar_count
        );
    }
    Ok(())
}

fn describe_range(row: &CacheStatus) -> String {
    match (row.cached, row.readable, row.start, row.end) {
        (false, _, _, _) => "(not cached)".into(),
        (true, false, _, _) => "(unreadable)".into(),
        (true, true, Some(start), Some(end)) => {
            format!("{} to {}", start.date_naive(), end.date_naive())
        }
        (true, true, _, _) => "(empty)".into(),
    }
}
