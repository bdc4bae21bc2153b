//! Trading calendar cache.
//!
//! One Parquet file per provider at `{base_dir}/_calendar/{provider}.parquet`
//! holding a single `date` column of UTC-midnight timestamps. The cache only
//! grows: a request outside the cached span asks the loader for the missing
//! days and persists the union.

use super::observer::{null_observer, SyncObserver};
use super::parquet;
use super::provider::DataError;
use crate::time::{self, ToUtcDate};
use chrono::NaiveDate;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Strictly increasing, duplicate-free set of trading days (UTC dates).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    days: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Build a calendar from unordered, possibly duplicated days.
    pub fn from_days(days: impl IntoIterator<Item = NaiveDate>) -> Self {
        let mut days: Vec<NaiveDate> = days.into_iter().collect();
        days.sort_unstable();
        days.dedup();
        Self { days }
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.days.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.days.last().copied()
    }

    /// True when the cached span reaches both `start` and `end`.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => first <= start && end <= last,
            _ => false,
        }
    }

    pub fn union(&self, other: &TradingCalendar) -> TradingCalendar {
        TradingCalendar::from_days(self.days.iter().chain(other.days.iter()).copied())
    }

    /// Days within `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> TradingCalendar {
        let lo = self.days.partition_point(|d| *d < start);
        let hi = self.days.partition_point(|d| *d <= end);
        TradingCalendar {
            days: self.days[lo..hi.max(lo)].to_vec(),
        }
    }

    pub fn into_days(self) -> Vec<NaiveDate> {
        self.days
    }
}

impl<'a> IntoIterator for &'a TradingCalendar {
    type Item = &'a NaiveDate;
    type IntoIter = std::slice::Iter<'a, NaiveDate>;

    fn into_iter(self) -> Self::IntoIter {
        self.days.iter()
    }
}

/// Persistent, grow-only trading calendar cache for one provider.
pub struct TradingCalendarCache {
    path: PathBuf,
    provider: String,
    calendar: Option<TradingCalendar>,
    observer: Arc<dyn SyncObserver>,
}

impl TradingCalendarCache {
    pub fn new(base_dir: impl AsRef<Path>, provider: &str) -> Self {
        Self {
            path: base_dir
                .as_ref()
                .join("_calendar")
                .join(format!("{provider}.parquet")),
            provider: provider.to_string(),
            calendar: None,
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

    /// Location of the persisted calendar.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trading days in `[start, end]`, refreshing through `loader` when the
    /// cache does not span the request.
    ///
    /// Bounds are normalized to UTC dates first (naive input is taken as UTC).
    /// The loader receives the requested bounds and returns the trading days
    /// it knows of; they are merged into the cache and persisted before the
    /// answer is computed. A loader error leaves the cache untouched. An empty
    /// result is valid (holiday span).
    pub fn get<F, D>(&mut self, loader: F, start: D, end: D) -> Result<TradingCalendar, DataError>
    where
        F: FnOnce(NaiveDate, NaiveDate) -> Result<Vec<NaiveDate>, DataError>,
        D: ToUtcDate,
    {
        let (start, end) = (start.to_utc_date(), end.to_utc_date());
        if start > end {
            return Ok(TradingCalendar::default());
        }

        if !self.cached().covers(start, end) {
            self.observer.on_calendar_refresh(&self.provider, start, end);
            let fetched = TradingCalendar::from_days(loader(start, end)?);
            let merged = self.cached().union(&fetched);
            self.save(merged)?;
        }

        Ok(self.cached().between(start, end))
    }

    /// The full in-memory calendar, read from disk on first use.
    ///
    /// A missing file is an empty calendar; an unreadable one is reported to
    /// the observer and also treated as empty, so the next `get` rebuilds it.
    pub fn cached(&mut self) -> &TradingCalendar {
        if self.calendar.is_none() {
            let loaded = if self.path.exists() {
                match read_calendar(&self.path) {
                    Ok(cal) => cal,
                    Err(e) => {
                        self.observer.on_calendar_unreadable(&self.path, &e);
                        TradingCalendar::default()
                    }
                }
            } else {
                TradingCalendar::default()
            };
            self.calendar = Some(loaded);
        }
        self.calendar.get_or_insert_with(TradingCalendar::default)
    }

    fn save(&mut self, calendar: TradingCalendar) -> Result<(), DataError> {
        let millis: Vec<i64> = calendar
            .days()
            .iter()
            .map(|d| time::to_millis(time::utc_midnight(*d)))
            .collect();
        let mut df = DataFrame::new(vec![parquet::millis_column("date", millis)?])
            .map_err(|e| DataError::ParquetError(format!("calendar frame: {e}")))?;
        parquet::write_atomic(&mut df, &self.path)?;
        self.calendar = Some(calendar);
        Ok(())
    }
}

fn read_calendar(path: &Path) -> Result<TradingCalendar, DataError> {
    let df = parquet::read(path)?;
    let mut days = Vec::with_capacity(df.height());
    for (i, ms) in parquet::millis_values(&df, "date")?.into_iter().enumerate() {
        let day = ms
            .and_then(time::from_millis)
            .ok_or_else(|| DataError::CalendarError(format!("null or invalid date at row {i}")))?;
        days.push(day.date_naive());
    }
    Ok(TradingCalendar::from_days(days))
}
