//! Conversions between bar series and Polars DataFrames.
//!
//! The canonical table has exactly six lower-case columns:
//! `timestamp` (Datetime µs, UTC), `open`, `high`, `low`, `close` (Float64),
//! `volume` (UInt64). Reading is lenient about what other writers produced:
//! column names are matched case-insensitively, prices and volume are cast,
//! and naive or zoned timestamp columns are both accepted as UTC instants.

use crate::domain::{Bar, BarSeries};
use chrono::DateTime;
use polars::prelude::*;

pub const TIMESTAMP: &str = "timestamp";

impl BarSeries {
    /// Bar table for downstream consumers: canonical columns, ascending by timestamp.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        series_to_dataframe(self)
    }
}

pub fn series_to_dataframe(series: &BarSeries) -> PolarsResult<DataFrame> {
    let bars = series.bars();
    let micros: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_micros()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new(TIMESTAMP.into(), micros).cast(&DataType::Datetime(
            TimeUnit::Microseconds,
            Some("UTC".into()),
        ))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
}

/// Find a column by case-insensitive name.
fn column<'a>(df: &'a DataFrame, name: &str) -> PolarsResult<&'a Column> {
    let actual = df
        .get_column_names()
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(name))
        .ok_or_else(|| polars_err!(ColumnNotFound: "missing column '{}'", name))?;
    df.column(actual.as_str())
}

/// Timestamp column as UTC microseconds since the epoch.
///
/// Zoned columns already hold UTC instants physically; naive columns are taken as UTC.
fn timestamp_micros(df: &DataFrame) -> PolarsResult<Vec<Option<i64>>> {
    let col = column(df, TIMESTAMP)?;
    let micros = match col.dtype() {
        DataType::Datetime(_, tz) => col
            .cast(&DataType::Datetime(TimeUnit::Microseconds, tz.clone()))?
            .cast(&DataType::Int64)?,
        DataType::Date => {
            let days = col.cast(&DataType::Int32)?;
            let days = days.i32()?;
            return Ok(days
                .into_iter()
                .map(|d| d.map(|d| i64::from(d) * 86_400_000_000))
                .collect());
        }
        other => polars_bail!(SchemaMismatch: "timestamp column has unsupported type {:?}", other),
    };
    Ok(micros.i64()?.into_iter().collect())
}

/// Convert a DataFrame back to a bar series, sorted ascending with duplicate timestamps dropped.
pub fn dataframe_to_series(df: &DataFrame) -> PolarsResult<BarSeries> {
    let micros = timestamp_micros(df)?;

    let open = column(df, "open")?.cast(&DataType::Float64)?;
    let high = column(df, "high")?.cast(&DataType::Float64)?;
    let low = column(df, "low")?.cast(&DataType::Float64)?;
    let close = column(df, "close")?.cast(&DataType::Float64)?;
    let volume = column(df, "volume")?.cast(&DataType::UInt64)?;

    let open_ca = open.f64()?;
    let high_ca = high.f64()?;
    let low_ca = low.f64()?;
    let close_ca = close.f64()?;
    let vol_ca = volume.u64()?;

    let mut bars = Vec::with_capacity(df.height());
    for (i, ts) in micros.into_iter().enumerate() {
        let ts = ts.ok_or_else(|| polars_err!(ComputeError: "null timestamp at row {}", i))?;
        let timestamp = DateTime::from_timestamp_micros(ts)
            .ok_or_else(|| polars_err!(ComputeError: "timestamp out of range at row {}", i))?;
        let price = |ca: &Float64Chunked, field: &str| {
            ca.get(i)
                .ok_or_else(|| polars_err!(ComputeError: "null {} at row {}", field, i))
        };
        bars.push(Bar {
            timestamp,
            open: price(open_ca, "open")?,
            high: price(high_ca, "high")?,
            low: price(low_ca, "low")?,
            close: price(close_ca, "close")?,
            volume: vol_ca
                .get(i)
                .ok_or_else(|| polars_err!(ComputeError: "null volume at row {}", i))?,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(BarSeries::from_bars(bars))
}
