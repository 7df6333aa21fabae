//! Canonicalization of provider output before it is served or persisted.
//!
//! Sorts ascending, drops duplicate timestamps (first occurrence wins), drops
//! bars outside the requested range and bars that fail the OHLC sanity check.
//! After this pass a series satisfies the strictly-increasing invariant.

use crate::domain::{Bar, BarSeries, TimeSpan};

/// Counts of what canonicalization removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalReport {
    pub duplicates: usize,
    pub out_of_range: usize,
    pub insane: usize,
}

impl CanonicalReport {
    pub fn total_dropped(&self) -> usize {
        self.duplicates + self.out_of_range + self.insane
    }
}

/// Canonicalize fetched bars against the range they were requested for.
pub fn canonicalize(bars: Vec<Bar>, range: TimeSpan) -> (BarSeries, CanonicalReport) {
    let mut report = CanonicalReport::default();

    let mut kept: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        if !range.contains(bar.timestamp) {
            report.out_of_range += 1;
        } else if !bar.is_sane() {
            report.insane += 1;
        } else {
            kept.push(bar);
        }
    }

    // Stable sort keeps provider order among equal timestamps, so dedup keeps the first.
    kept.sort_by_key(|b| b.timestamp);
    let before = kept.len();
    kept.dedup_by_key(|b| b.timestamp);
    report.duplicates = before - kept.len();

    (BarSeries::from_bars(kept), report)
}

/// True when timestamps are strictly increasing.
pub fn is_canonical(series: &BarSeries) -> bool {
    series
        .bars()
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp)
}
