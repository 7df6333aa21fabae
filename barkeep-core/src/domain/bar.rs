//! Bars, the fundamental market data unit, and the ordered series built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV bar for a single ticker at a single instant.
///
/// Timestamps are always UTC. Sources that deliver naive or zoned timestamps are
/// normalized before a `Bar` is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: positive prices, high >= low.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.open > 0.0
            && self.high > 0.0
            && self.low > 0.0
            && self.close > 0.0
    }
}

/// Sampling unit of a bar series.
///
/// Each granularity has its own store partition and its own provider timeframe;
/// the two are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Minute,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Daily, Granularity::Minute];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Minute => "minute",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" | "1d" => Ok(Granularity::Daily),
            "minute" | "min" | "1m" => Ok(Granularity::Minute),
            other => Err(format!("unknown granularity '{other}' (expected daily or minute)")),
        }
    }
}

/// Closed time interval `[start, end]` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// An ordered sequence of bars for one (ticker, granularity) pair.
///
/// Invariant: timestamps strictly increasing. Series produced by the store and by
/// [`crate::data::canonicalize`] uphold it; `from_bars` trusts its input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Observed span `[min timestamp, max timestamp]`, `None` when empty.
    pub fn span(&self) -> Option<TimeSpan> {
        let start = self.bars.iter().map(|b| b.timestamp).min()?;
        let end = self.bars.iter().map(|b| b.timestamp).max()?;
        Some(TimeSpan::new(start, end))
    }

    /// Bars whose timestamp falls in `[start, end]`, both ends inclusive.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> BarSeries {
        let span = TimeSpan::new(start, end);
        self.bars
            .iter()
            .filter(|b| span.contains(b.timestamp))
            .cloned()
            .collect()
    }

    /// Closing prices in series order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

impl FromIterator<Bar> for BarSeries {
    fn from_iter<I: IntoIterator<Item = Bar>>(iter: I) -> Self {
        Self {
            bars: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(bar_at(2, 100.0).is_sane());
    }

    #[test]
    fn inverted_bar_is_not_sane() {
        let mut bar = bar_at(2, 100.0);
        bar.high = 90.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn nan_bar_is_void() {
        let mut bar = bar_at(2, 100.0);
        bar.close = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn span_of_empty_series_is_none() {
        assert_eq!(BarSeries::empty().span(), None);
    }

    #[test]
    fn span_covers_first_and_last() {
        let series = BarSeries::from_bars(vec![bar_at(2, 100.0), bar_at(3, 101.0), bar_at(5, 99.0)]);
        let span = series.span().unwrap();
        assert_eq!(span.start, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(span.end, Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn between_is_inclusive_on_both_ends() {
        let series = BarSeries::from_bars(vec![
            bar_at(2, 100.0),
            bar_at(3, 101.0),
            bar_at(4, 102.0),
            bar_at(5, 103.0),
        ]);
        let sub = series.between(
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
        );
        assert_eq!(sub.closes(), vec![101.0, 102.0]);
    }

    #[test]
    fn granularity_parses_aliases() {
        assert_eq!("Daily".parse::<Granularity>(), Ok(Granularity::Daily));
        assert_eq!("1m".parse::<Granularity>(), Ok(Granularity::Minute));
        assert!("hourly".parse::<Granularity>().is_err());
    }
}
