//! Coverage validation: is a stored series good enough to answer a request?
//!
//! A stored span `[data_start, data_end]` covers a required span `[start, end]`
//! when `data_start <= start + tolerance` and `data_end >= end - tolerance`.
//! The tolerance absorbs weekends and holidays at either edge of the request,
//! where the market simply had no bar to store.

use crate::domain::TimeSpan;
use chrono::Duration;
use std::fmt;

/// Tolerance applied at both edges of a request.
pub const DEFAULT_TOLERANCE_DAYS: i64 = 5;

pub fn default_tolerance() -> Duration {
    Duration::days(DEFAULT_TOLERANCE_DAYS)
}

/// Why a coverage check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No store file for the key.
    NotCached,
    /// The store file holds no bars.
    Empty,
    /// The store file could not be read.
    Unreadable,
    /// Stored data begins too long after the requested start.
    StartsTooLate,
    /// Stored data ends too long before the requested end.
    EndsTooEarly,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MissReason::NotCached => "not cached",
            MissReason::Empty => "cached series is empty",
            MissReason::Unreadable => "cached file unreadable",
            MissReason::StartsTooLate => "cached data starts too late",
            MissReason::EndsTooEarly => "cached data ends too early",
        };
        f.write_str(s)
    }
}

/// Outcome of a coverage check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Hit,
    Miss(MissReason),
}

impl Coverage {
    pub fn is_hit(&self) -> bool {
        matches!(self, Coverage::Hit)
    }
}

/// Decide HIT or MISS for a stored span against a required span.
///
/// `stored` is `None` for an empty series, which is always a miss. When both
/// edges fall short the start is reported.
pub fn has_coverage(stored: Option<TimeSpan>, required: TimeSpan, tolerance: Duration) -> Coverage {
    let Some(stored) = stored else {
        return Coverage::Miss(MissReason::Empty);
    };
    if stored.start > required.start + tolerance {
        return Coverage::Miss(MissReason::StartsTooLate);
    }
    if stored.end < required.end - tolerance {
        return Coverage::Miss(MissReason::EndsTooEarly);
    }
    Coverage::Hit
}
