//! Domain types: bars, series, granularity, requests, UTC normalization.

pub mod bar;
pub mod request;
pub mod time;

pub use bar::{Bar, BarSeries, Granularity, TimeSpan};
pub use request::{validate_ticker, RequestError, SeriesRequest};
pub use time::IntoUtc;
