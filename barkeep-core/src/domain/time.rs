//! UTC normalization for caller-supplied instants.
//!
//! Callers hand the retrieval entry points whatever they have: a zoned
//! `DateTime`, a naive timestamp, or a bare calendar date. Everything is turned
//! into a `DateTime<Utc>` before it reaches coverage validation or the provider.
//! Naive values are read as UTC wall time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Conversion into a UTC instant.
pub trait IntoUtc {
    fn into_utc(self) -> DateTime<Utc>;
}

impl<Tz: TimeZone> IntoUtc for DateTime<Tz> {
    fn into_utc(self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

impl IntoUtc for NaiveDateTime {
    fn into_utc(self) -> DateTime<Utc> {
        self.and_utc()
    }
}

/// A bare date means midnight UTC on that day.
impl IntoUtc for NaiveDate {
    fn into_utc(self) -> DateTime<Utc> {
        self.and_time(NaiveTime::MIN).and_utc()
    }
}
