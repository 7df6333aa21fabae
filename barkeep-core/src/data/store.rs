//! Parquet bar store, one file per (ticker, granularity).
//!
//! Layout: `{daily_root}/{TICKER}.parquet` and `{minute_root}/{TICKER}.parquet`.
//!
//! - Writes are atomic: write to a temp file next to the target, then rename over it.
//! - Every write replaces the file; there is no merging with earlier content.
//! - Reads normalize the timestamp column to UTC and return a sorted series.

use super::frame::{dataframe_to_series, series_to_dataframe};
use crate::domain::{BarSeries, Granularity};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("refusing to store an empty series for '{ticker}' ({granularity})")]
    EmptyWrite {
        ticker: String,
        granularity: Granularity,
    },
}

/// Persistence seam for the cache orchestrator.
pub trait BarStore: Send + Sync {
    /// Whether the backing file exists, regardless of whether it is readable.
    fn exists(&self, ticker: &str, granularity: Granularity) -> bool;

    /// Load the full stored series.
    fn read(&self, ticker: &str, granularity: Granularity) -> Result<BarSeries, StoreError>;

    /// Replace the stored series.
    fn write(
        &self,
        ticker: &str,
        granularity: Granularity,
        series: &BarSeries,
    ) -> Result<(), StoreError>;

    /// Tickers with a stored file for this granularity.
    fn list(&self, _granularity: Granularity) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

/// The Parquet store.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    daily_root: PathBuf,
    minute_root: PathBuf,
}

impl ParquetStore {
    pub fn new(daily_root: impl Into<PathBuf>, minute_root: impl Into<PathBuf>) -> Self {
        Self {
            daily_root: daily_root.into(),
            minute_root: minute_root.into(),
        }
    }

    /// Store rooted at `{root}/daily` and `{root}/minute`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join("daily"), root.join("minute"))
    }

    /// Root directory for a granularity.
    pub fn root(&self, granularity: Granularity) -> &Path {
        match granularity {
            Granularity::Daily => &self.daily_root,
            Granularity::Minute => &self.minute_root,
        }
    }

    /// Path to the Parquet file for a ticker.
    pub fn path_for(&self, ticker: &str, granularity: Granularity) -> PathBuf {
        self.root(granularity).join(format!("{ticker}.parquet"))
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{}.tmp", std::process::id()));
        PathBuf::from(name)
    }
}

impl BarStore for ParquetStore {
    fn exists(&self, ticker: &str, granularity: Granularity) -> bool {
        self.path_for(ticker, granularity).is_file()
    }

    fn read(&self, ticker: &str, granularity: Granularity) -> Result<BarSeries, StoreError> {
        let path = self.path_for(ticker, granularity);
        let read_err = |reason: String| StoreError::Read {
            path: path.clone(),
            reason,
        };

        let file = fs::File::open(&path).map_err(|e| read_err(format!("open: {e}")))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| read_err(format!("parquet: {e}")))?;
        let series = dataframe_to_series(&df).map_err(|e| read_err(format!("columns: {e}")))?;

        debug!(ticker, %granularity, bars = series.len(), path = %path.display(), "read stored series");
        Ok(series)
    }

    fn write(
        &self,
        ticker: &str,
        granularity: Granularity,
        series: &BarSeries,
    ) -> Result<(), StoreError> {
        if series.is_empty() {
            return Err(StoreError::EmptyWrite {
                ticker: ticker.to_string(),
                granularity,
            });
        }

        let path = self.path_for(ticker, granularity);
        let write_err = |reason: String| StoreError::Write {
            path: path.clone(),
            reason,
        };

        fs::create_dir_all(self.root(granularity))
            .map_err(|e| write_err(format!("create dir: {e}")))?;

        let mut df = series_to_dataframe(series).map_err(|e| write_err(format!("frame: {e}")))?;
        let tmp_path = Self::temp_path(&path);

        let written = fs::File::create(&tmp_path)
            .map_err(|e| format!("create temp file: {e}"))
            .and_then(|mut file| {
                ParquetWriter::new(&mut file)
                    .finish(&mut df)
                    .map_err(|e| format!("parquet: {e}"))?;
                file.sync_all().map_err(|e| format!("sync: {e}"))
            })
            .and_then(|()| fs::rename(&tmp_path, &path).map_err(|e| format!("atomic rename: {e}")));

        if let Err(reason) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_err(reason));
        }

        debug!(ticker, %granularity, bars = series.len(), path = %path.display(), "wrote stored series");
        Ok(())
    }

    fn list(&self, granularity: Granularity) -> Result<Vec<String>, StoreError> {
        let root = self.root(granularity);
        if !root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(root).map_err(|e| StoreError::Read {
            path: root.to_path_buf(),
            reason: format!("read dir: {e}"),
        })?;

        let mut tickers: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        tickers.sort();
        Ok(tickers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use chrono::{TimeZone, Utc};

    fn sample() -> BarSeries {
        BarSeries::from_bars(vec![
            Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap(),
                open: 100.0,
                high: 102.0,
                low: 99.0,
                close: 101.0,
                volume: 1000,
            },
            Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 3, 5, 0, 0).unwrap(),
                open: 101.0,
                high: 103.0,
                low: 100.0,
                close: 102.0,
                volume: 1100,
            },
        ])
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::under(dir.path());

        store.write("SPY", Granularity::Daily, &sample()).unwrap();
        assert_eq!(store.read("SPY", Granularity::Daily).unwrap(), sample());
    }

    #[test]
    fn granularities_are_separate_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::under(dir.path());

        store.write("SPY", Granularity::Daily, &sample()).unwrap();
        assert!(store.exists("SPY", Granularity::Daily));
        assert!(!store.exists("SPY", Granularity::Minute));
        assert_eq!(
            store.path_for("SPY", Granularity::Daily),
            dir.path().join("daily").join("SPY.parquet")
        );
    }

    #[test]
    fn write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::under(dir.path());

        store.write("SPY", Granularity::Daily, &sample()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path().join("daily"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["SPY.parquet".to_string()]);
    }

    #[test]
    fn empty_write_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::under(dir.path());

        let err = store
            .write("SPY", Granularity::Daily, &BarSeries::empty())
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyWrite { .. }));
        assert!(!store.exists("SPY", Granularity::Daily));
    }

    #[test]
    fn corrupt_file_exists_but_fails_to_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::under(dir.path());
        fs::create_dir_all(dir.path().join("daily")).unwrap();
        fs::write(store.path_for("SPY", Granularity::Daily), b"not parquet").unwrap();

        assert!(store.exists("SPY", Granularity::Daily));
        assert!(matches!(
            store.read("SPY", Granularity::Daily),
            Err(StoreError::Read { .. })
        ));
    }

    #[test]
    fn list_reports_stored_tickers() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::under(dir.path());

        store.write("SPY", Granularity::Daily, &sample()).unwrap();
        store.write("BRK.B", Granularity::Daily, &sample()).unwrap();
        assert_eq!(
            store.list(Granularity::Daily).unwrap(),
            vec!["BRK.B".to_string(), "SPY".to_string()]
        );
        assert!(store.list(Granularity::Minute).unwrap().is_empty());
    }
}
