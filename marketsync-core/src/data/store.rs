//! Partitioned Parquet store with Hive-style layout.
//!
//! Layout: `{base_dir}/symbol={SYMBOL}/freq={FREQ}/year={YEAR}/data.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Merge-on-write upsert, deduplicated on timestamp (first row wins)
//! - Gap detection against a frequency's nominal step
//! - Partition listing with row counts and content hashes

use super::observer::{null_observer, SyncObserver};
use super::parquet;
use super::provider::DataError;
use crate::domain::{Bar, Frequency, Range};
use crate::time;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PARTITION_FILE: &str = "data.parquet";
const CORE_COLUMNS: [&str; 8] = [
    "symbol",
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "turnover",
];

/// Summary of one stored partition.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub year: i32,
    pub path: PathBuf,
    pub rows: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub bytes: u64,
    /// BLAKE3 of the file contents.
    pub content_hash: String,
}

/// The partitioned bar store.
pub struct PartitionedStore {
    base_dir: PathBuf,
    observer: Arc<dyn SyncObserver>,
}

impl PartitionedStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            observer: null_observer(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.set_observer(observer);
        self
    }

    pub(crate) fn set_observer(&mut self, observer: Arc<dyn SyncObserver>) {
        self.observer = observer;
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `{base_dir}/symbol={SYMBOL}/freq={FREQ}/`
    fn series_dir(&self, symbol: &str, freq: Frequency) -> PathBuf {
        self.base_dir
            .join(format!("symbol={symbol}"))
            .join(format!("freq={}", freq.key()))
    }

    /// Path of the partition file for `(symbol, freq, year)`.
    pub fn partition_path(&self, symbol: &str, freq: Frequency, year: i32) -> PathBuf {
        self.series_dir(symbol, freq)
            .join(format!("year={year}"))
            .join(PARTITION_FILE)
    }

    /// Existing partition years for a series, ascending.
    fn partition_years(&self, symbol: &str, freq: Frequency) -> Result<Vec<i32>, DataError> {
        let dir = self.series_dir(symbol, freq);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir)
            .map_err(|e| DataError::IoError(format!("read dir {}: {e}", dir.display())))?;

        let mut years = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::IoError(format!("dir entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(year) = name.strip_prefix("year=").and_then(|y| y.parse::<i32>().ok())
            else {
                continue;
            };
            if entry.path().join(PARTITION_FILE).is_file() {
                years.insert(year);
            }
        }
        Ok(years.into_iter().collect())
    }

    /// Load every stored bar for a series, sorted by timestamp ascending.
    ///
    /// A series with no partitions yields an empty vector.
    pub fn load(&self, symbol: &str, freq: Frequency) -> Result<Vec<Bar>, DataError> {
        let mut all_bars = Vec::new();
        for year in self.partition_years(symbol, freq)? {
            all_bars.extend(read_partition(&self.partition_path(symbol, freq, year))?);
        }
        all_bars.sort_by_key(|b| b.timestamp);
        Ok(all_bars)
    }

    /// Merge `bars` into the store and return the number of partitions written.
    ///
    /// Within the batch and against stored rows, the first row seen for a
    /// timestamp wins: a bar already on disk is never replaced by a newly
    /// fetched one for the same timestamp. Timestamps are compared at the
    /// stored millisecond precision.
    pub fn upsert(&self, symbol: &str, freq: Frequency, bars: &[Bar]) -> Result<usize, DataError> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut by_year: BTreeMap<i32, Vec<&Bar>> = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for bar in bars {
            if seen.insert(time::to_millis(bar.timestamp)) {
                by_year.entry(bar.year()).or_default().push(bar);
            }
        }

        for (year, incoming) in &by_year {
            let path = self.partition_path(symbol, freq, *year);
            let existing = if path.exists() {
                read_partition(&path)?
            } else {
                Vec::new()
            };

            let mut merged: BTreeMap<i64, &Bar> = BTreeMap::new();
            for bar in existing.iter().chain(incoming.iter().copied()) {
                merged.entry(time::to_millis(bar.timestamp)).or_insert(bar);
            }

            let rows: Vec<&Bar> = merged.into_values().collect();
            let mut df = bars_to_dataframe(&rows)?;
            parquet::write_atomic(&mut df, &path)?;
            self.observer
                .on_partition_written(symbol, freq, *year, rows.len());
        }

        Ok(by_year.len())
    }

    /// Inclusive sub-ranges of `[start, end]` where no bar exists at `freq`'s step.
    ///
    /// Yields a leading gap before the first stored point, internal gaps
    /// between points more than one step apart, and a trailing gap through
    /// `end`. With no stored point inside the range the whole range is one gap.
    pub fn missing_ranges(
        existing: &[Bar],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        freq: Frequency,
    ) -> Vec<Range<DateTime<Utc>>> {
        let Some(full) = Range::new(start, end) else {
            return Vec::new();
        };

        let mut stamps: Vec<DateTime<Utc>> = existing
            .iter()
            .map(|b| b.timestamp)
            .filter(|ts| full.contains(*ts))
            .collect();
        stamps.sort();
        stamps.dedup();

        let (Some(&first), Some(&last)) = (stamps.first(), stamps.last()) else {
            return vec![full];
        };

        let step = freq.step();
        let mut gaps = Vec::new();

        gaps.extend(Range::new(start, first - step));
        for pair in stamps.windows(2) {
            let expected = pair[0] + step;
            if pair[1] > expected {
                gaps.extend(Range::new(expected, pair[1] - step));
            }
        }
        gaps.extend(Range::new(last + step, end));

        gaps
    }

    /// Describe every stored partition of a series.
    pub fn partitions(&self, symbol: &str, freq: Frequency) -> Result<Vec<PartitionInfo>, DataError> {
        let mut infos = Vec::new();
        for year in self.partition_years(symbol, freq)? {
            let path = self.partition_path(symbol, freq, year);
            let bytes = fs::read(&path)
                .map_err(|e| DataError::IoError(format!("read {}: {e}", path.display())))?;
            let bars = read_partition(&path)?;
            infos.push(PartitionInfo {
                year,
                rows: bars.len(),
                first: bars.first().map(|b| b.timestamp),
                last: bars.last().map(|b| b.timestamp),
                bytes: bytes.len() as u64,
                content_hash: blake3::hash(&bytes).to_hex().to_string(),
                path,
            });
        }
        Ok(infos)
    }

    /// Symbols with at least one stored partition at `freq`, sorted.
    pub fn symbols(&self, freq: Frequency) -> Result<Vec<String>, DataError> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.base_dir)
            .map_err(|e| DataError::IoError(format!("read dir: {e}")))?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::IoError(format!("dir entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(symbol) = name.strip_prefix("symbol=") {
                if !self.partition_years(symbol, freq)?.is_empty() {
                    symbols.push(symbol.to_string());
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

// ── Parquet conversion ──────────────────────────────────────────────

fn read_partition(path: &Path) -> Result<Vec<Bar>, DataError> {
    let df = parquet::read(path)?;
    dataframe_to_bars(&df)
        .map_err(|e| DataError::ParquetError(format!("{}: {e}", path.display())))
}

/// Convert bars to a DataFrame. Extra fields become nullable Float64 columns,
/// one per key seen in any row, in key order.
fn bars_to_dataframe(bars: &[&Bar]) -> Result<DataFrame, DataError> {
    let symbols: Vec<&str> = bars.iter().map(|b| b.symbol.as_str()).collect();
    let millis: Vec<i64> = bars.iter().map(|b| time::to_millis(b.timestamp)).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let turnovers: Vec<f64> = bars.iter().map(|b| b.turnover).collect();

    let mut columns = vec![
        Column::new("symbol".into(), symbols),
        parquet::millis_column("timestamp", millis)?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("turnover".into(), turnovers),
    ];

    let extra_keys: BTreeSet<&str> = bars
        .iter()
        .flat_map(|b| b.extra.keys().map(String::as_str))
        .filter(|k| !CORE_COLUMNS.contains(k))
        .collect();
    for key in extra_keys {
        let values: Vec<Option<f64>> = bars.iter().map(|b| b.extra.get(key).copied()).collect();
        columns.push(Column::new(key.into(), values));
    }

    DataFrame::new(columns).map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

/// Convert a partition DataFrame back to bars.
fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, DataError> {
    let symbols = parquet::str_values(df, "symbol")?;
    let stamps = parquet::millis_values(df, "timestamp")?;
    let opens = parquet::f64_values(df, "open")?;
    let highs = parquet::f64_values(df, "high")?;
    let lows = parquet::f64_values(df, "low")?;
    let closes = parquet::f64_values(df, "close")?;
    let volumes = parquet::f64_values(df, "volume")?;
    let turnovers = parquet::f64_values(df, "turnover")?;

    let mut extras: Vec<(String, Vec<Option<f64>>)> = Vec::new();
    for column in df.get_columns() {
        let name = column.name().as_str();
        if CORE_COLUMNS.contains(&name) || !parquet::is_numeric(column.dtype()) {
            continue;
        }
        extras.push((name.to_string(), parquet::f64_values(df, name)?));
    }

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let timestamp = stamps[i]
            .and_then(time::from_millis)
            .ok_or_else(|| DataError::ParquetError(format!("null timestamp at row {i}")))?;

        let extra = extras
            .iter()
            .filter_map(|(name, values)| values[i].map(|v| (name.clone(), v)))
            .collect();

        bars.push(Bar {
            symbol: symbols[i].clone().unwrap_or_default(),
            timestamp,
            open: opens[i].unwrap_or(f64::NAN),
            high: highs[i].unwrap_or(f64::NAN),
            low: lows[i].unwrap_or(f64::NAN),
            close: closes[i].unwrap_or(f64::NAN),
            volume: volumes[i].unwrap_or(f64::NAN),
            turnover: turnovers[i].unwrap_or(f64::NAN),
            extra,
        });
    }

    Ok(bars)
}
