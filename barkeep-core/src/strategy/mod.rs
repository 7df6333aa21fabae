//! Strategy capability interface.
//!
//! The data layer never computes signals. This module fixes the boundary a
//! strategy implements so the same logic runs over cached history (backtests)
//! and freshly fetched bars (live):
//! - [`Strategy`]: signal, sizing and fill handling
//! - [`StrategyProfile`]: tickers, lookback and risk metadata
//! - [`StrategyRegistry`]: stable key to constructor
//! - [`OrderTracker`]: pending-order and trailing-stop bookkeeping, embedded by composition

pub mod registry;
pub mod sma;
pub mod tracker;

pub use registry::{StrategyRegistry, MIN_LOOKBACK_DAYS};
pub use sma::SmaCrossover;
pub use tracker::{OrderTracker, TrailingStop};

use crate::domain::BarSeries;
use crate::orders::{Fill, TrailPercent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy '{key}' (available: {available})")]
    Unknown { key: String, available: String },

    #[error("strategy '{0}' is already registered")]
    Duplicate(String),

    #[error("invalid strategy parameters: {0}")]
    InvalidParams(String),
}

/// What a strategy wants to do after seeing the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Static metadata the data layer and runners read from a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub name: String,
    pub tickers: Vec<String>,
    /// Daily bars needed to produce a signal.
    pub lookback_days: u32,
    /// Fraction of available cash committed per position.
    pub position_fraction: f64,
    pub trailing_stop: Option<TrailPercent>,
}

/// A trading strategy.
///
/// Strategies work on daily bars only. `produce_signal` sees the whole series
/// up to and including the latest bar.
pub trait Strategy: Send {
    fn profile(&self) -> &StrategyProfile;

    fn produce_signal(&mut self, bars: &BarSeries) -> Signal;

    /// Whole shares to trade given available cash and the current price.
    fn size_position(&self, cash: f64, price: f64) -> u64;

    fn on_fill(&mut self, fill: &Fill);
}
