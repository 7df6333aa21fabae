//! Simple moving average crossover.
//!
//! Buy when the fast SMA crosses above the slow SMA while flat.
//! Sell when it crosses back below, or when the trailing stop is hit.

use super::tracker::OrderTracker;
use super::{Signal, Strategy, StrategyError, StrategyProfile};
use crate::domain::BarSeries;
use crate::orders::{Fill, TrailPercent};
use tracing::info;

pub const KEY: &str = "sma_crossover";

#[derive(Debug, Clone)]
pub struct SmaCrossover {
    profile: StrategyProfile,
    fast_period: usize,
    slow_period: usize,
    tracker: OrderTracker,
}

impl SmaCrossover {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        trailing_stop: Option<f64>,
    ) -> Result<Self, StrategyError> {
        if fast_period == 0 {
            return Err(StrategyError::InvalidParams("fast_period must be >= 1".into()));
        }
        if slow_period <= fast_period {
            return Err(StrategyError::InvalidParams(format!(
                "slow_period ({slow_period}) must be > fast_period ({fast_period})"
            )));
        }
        let trailing_stop = trailing_stop
            .map(TrailPercent::new)
            .transpose()
            .map_err(|e| StrategyError::InvalidParams(e.to_string()))?;

        Ok(Self {
            profile: StrategyProfile {
                name: KEY.to_string(),
                tickers: vec!["SPY".to_string()],
                lookback_days: 30,
                position_fraction: 1.0,
                trailing_stop,
            },
            fast_period,
            slow_period,
            tracker: OrderTracker::new(),
        })
    }

    pub fn with_tickers(mut self, tickers: Vec<String>) -> Self {
        self.profile.tickers = tickers;
        self
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut OrderTracker {
        &mut self.tracker
    }

    /// (previous, current) fast-minus-slow spread at the last bar.
    fn spreads(&self, closes: &[f64]) -> Option<(f64, f64)> {
        let last = closes.len().checked_sub(1)?;
        if last < self.slow_period {
            return None;
        }
        let spread = |end: usize| {
            Some(mean_ending_at(closes, end, self.fast_period)? - mean_ending_at(closes, end, self.slow_period)?)
        };
        Some((spread(last - 1)?, spread(last)?))
    }
}

impl Default for SmaCrossover {
    fn default() -> Self {
        Self {
            profile: StrategyProfile {
                name: KEY.to_string(),
                tickers: vec!["SPY".to_string()],
                lookback_days: 30,
                position_fraction: 1.0,
                trailing_stop: TrailPercent::new(0.001).ok(),
            },
            fast_period: 10,
            slow_period: 30,
            tracker: OrderTracker::new(),
        }
    }
}

/// Mean of `values[end + 1 - period..=end]`; `None` if the window is short or holds a NaN.
fn mean_ending_at(values: &[f64], end: usize, period: usize) -> Option<f64> {
    let start = (end + 1).checked_sub(period)?;
    let window = values.get(start..=end)?;
    if window.iter().any(|v| v.is_nan()) {
        return None;
    }
    Some(window.iter().sum::<f64>() / period as f64)
}

impl Strategy for SmaCrossover {
    fn profile(&self) -> &StrategyProfile {
        &self.profile
    }

    fn produce_signal(&mut self, bars: &BarSeries) -> Signal {
        if self.tracker.has_pending() {
            return Signal::Hold;
        }
        let Some(last_close) = bars.last().map(|b| b.close) else {
            return Signal::Hold;
        };

        if !self.tracker.is_flat() && self.tracker.update_trailing_stop(last_close) {
            info!(close = last_close, "trailing stop hit");
            return Signal::Sell;
        }

        let closes = bars.closes();
        let Some((previous, current)) = self.spreads(&closes) else {
            return Signal::Hold;
        };

        if self.tracker.is_flat() && previous <= 0.0 && current > 0.0 {
            Signal::Buy
        } else if !self.tracker.is_flat() && previous >= 0.0 && current < 0.0 {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    fn size_position(&self, cash: f64, price: f64) -> u64 {
        if !price.is_finite() || price <= 0.0 || !cash.is_finite() || cash <= 0.0 {
            return 0;
        }
        (cash * self.profile.position_fraction / price).floor() as u64
    }

    fn on_fill(&mut self, fill: &Fill) {
        let was_flat = self.tracker.is_flat();
        self.tracker.record_fill(fill);
        if was_flat && !self.tracker.is_flat() {
            if let Some(trail) = self.profile.trailing_stop {
                if let Some(level) = self.tracker.arm_trailing_stop(trail) {
                    info!(symbol = %fill.symbol, %trail, stop = level, "trailing stop set");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::orders::OrderSide;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> BarSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: t0 + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1000,
            })
            .collect()
    }

    fn buy_fill(price: f64) -> Fill {
        Fill {
            order_id: "1".into(),
            symbol: "SPY".into(),
            side: OrderSide::Buy,
            qty: 10,
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap(),
        }
    }

    #[test]
    fn defaults_match_reference_parameters() {
        let strategy = SmaCrossover::default();
        let profile = strategy.profile();
        assert_eq!(profile.name, "sma_crossover");
        assert_eq!(profile.tickers, vec!["SPY"]);
        assert_eq!(profile.lookback_days, 30);
        assert_eq!(profile.trailing_stop.map(TrailPercent::fraction), Some(0.001));
    }

    #[test]
    fn rejects_bad_periods() {
        assert!(SmaCrossover::new(0, 5, None).is_err());
        assert!(SmaCrossover::new(5, 5, None).is_err());
        assert!(SmaCrossover::new(2, 4, Some(2.0)).is_err());
    }

    #[test]
    fn holds_without_enough_history() {
        let mut strategy = SmaCrossover::new(2, 4, None).unwrap();
        assert_eq!(strategy.produce_signal(&series(&[1.0, 2.0, 3.0])), Signal::Hold);
        assert_eq!(strategy.produce_signal(&BarSeries::empty()), Signal::Hold);
    }

    #[test]
    fn buys_on_golden_cross_and_sells_on_death_cross() {
        let mut strategy = SmaCrossover::new(2, 4, None).unwrap();

        // falling then a jump: fast crosses above slow on the last bar
        let up = series(&[10.0, 9.0, 8.0, 7.0, 6.0, 12.0]);
        assert_eq!(strategy.produce_signal(&up), Signal::Buy);

        strategy.on_fill(&buy_fill(12.0));
        let down = series(&[6.0, 7.0, 8.0, 9.0, 10.0, 4.0]);
        assert_eq!(strategy.produce_signal(&down), Signal::Sell);
    }

    #[test]
    fn trailing_stop_forces_exit() {
        let mut strategy = SmaCrossover::new(2, 4, Some(0.05)).unwrap();
        strategy.on_fill(&buy_fill(100.0));
        assert!(strategy.tracker().trailing_stop().is_some());

        let bars = series(&[100.0, 101.0, 102.0, 103.0, 104.0, 94.0]);
        assert_eq!(strategy.produce_signal(&bars), Signal::Sell);
    }

    #[test]
    fn pending_order_suppresses_signals() {
        let mut strategy = SmaCrossover::new(2, 4, None).unwrap();
        strategy.tracker_mut().submit("open-order");
        let up = series(&[10.0, 9.0, 8.0, 7.0, 6.0, 12.0]);
        assert_eq!(strategy.produce_signal(&up), Signal::Hold);
    }

    #[test]
    fn sizes_whole_shares_from_cash() {
        let strategy = SmaCrossover::default();
        assert_eq!(strategy.size_position(10_000.0, 300.0), 33);
        assert_eq!(strategy.size_position(10_000.0, 0.0), 0);
        assert_eq!(strategy.size_position(-5.0, 10.0), 0);
    }
}
