//! Sync orchestrator: calendar → gap detection → chunking → fetch → store.
//!
//! `MarketFetcher` drives one provider into one partitioned store. Symbols are
//! processed sequentially and chunks within a symbol in ascending order; each
//! non-empty chunk is persisted before the next is requested, so a failure
//! part-way through keeps everything fetched before it.

use super::calendar::{TradingCalendar, TradingCalendarCache};
use super::chunk::{chunk_dates, ChunkConfig};
use super::observer::{null_observer, SyncObserver};
use super::provider::{DataError, DataProvider};
use super::store::PartitionedStore;
use crate::domain::{Frequency, SecurityInfo};
use crate::time::ToUtcDate;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Why a symbol needed no fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The calendar has no trading day in the requested range.
    NoTradingDays,
    /// Every trading day in the range is already stored.
    UpToDate,
}

/// How a single symbol's sync ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Skipped(SkipReason),
    Success,
    /// Stopped at the first failing step. Rows stored before it are kept.
    PartialError { message: String },
}

/// Per-symbol sync report.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub symbol: String,
    /// Rows returned by the provider and handed to the store.
    pub fetched_rows: usize,
    /// Chunks planned for the symbol (including any not attempted).
    pub chunks: usize,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    fn skip(symbol: &str, reason: SkipReason) -> Self {
        Self {
            symbol: symbol.to_string(),
            fetched_rows: 0,
            chunks: 0,
            outcome: FetchOutcome::Skipped(reason),
        }
    }

    fn failed(symbol: &str, fetched_rows: usize, chunks: usize, error: &DataError) -> Self {
        Self {
            symbol: symbol.to_string(),
            fetched_rows,
            chunks,
            outcome: FetchOutcome::PartialError {
                message: error.to_string(),
            },
        }
    }

    /// True when no fetch was needed.
    pub fn skipped(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Skipped(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Success)
    }

    /// Error message, when the symbol failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::PartialError { message } => Some(message),
            _ => None,
        }
    }

    /// Short status for progress lines.
    pub fn status_label(&self) -> String {
        match &self.outcome {
            FetchOutcome::Skipped(SkipReason::NoTradingDays) => "skipped (no trading days)".into(),
            FetchOutcome::Skipped(SkipReason::UpToDate) => "skipped (up to date)".into(),
            FetchOutcome::Success => "ok".into(),
            FetchOutcome::PartialError { message } => format!("error: {message}"),
        }
    }
}

/// Summary of a batch sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows: usize,
    /// `(symbol, message)` for every failed symbol, in batch order.
    pub failures: Vec<(String, String)>,
}

impl SyncSummary {
    pub fn from_results(results: &[FetchResult]) -> Self {
        let mut summary = SyncSummary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            summary.rows += result.fetched_rows;
            match &result.outcome {
                FetchOutcome::Skipped(_) => summary.skipped += 1,
                FetchOutcome::Success => summary.succeeded += 1,
                FetchOutcome::PartialError { message } => {
                    summary.failed += 1;
                    summary
                        .failures
                        .push((result.symbol.clone(), message.clone()));
                }
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Incremental downloader for one provider and one store.
pub struct MarketFetcher {
    provider: Arc<dyn DataProvider>,
    store: PartitionedStore,
    calendar: TradingCalendarCache,
    chunking: ChunkConfig,
    observer: Arc<dyn SyncObserver>,
}

impl MarketFetcher {
    /// The calendar cache lives under the store's base directory, keyed on the
    /// provider name.
    pub fn new(provider: Arc<dyn DataProvider>, store: PartitionedStore) -> Self {
        let calendar = TradingCalendarCache::new(store.base_dir(), provider.name());
        Self {
            provider,
            store,
            calendar,
            chunking: ChunkConfig::default(),
            observer: null_observer(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Route events from the fetcher, its store and its calendar to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.store.set_observer(Arc::clone(&observer));
        self.calendar.set_observer(Arc::clone(&observer));
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &PartitionedStore {
        &self.store
    }

    pub fn provider(&self) -> &dyn DataProvider {
        self.provider.as_ref()
    }

    pub fn chunking(&self) -> ChunkConfig {
        self.chunking
    }

    /// Trading days in `[start, end]` through the calendar cache.
    pub fn trade_days<D: ToUtcDate>(&mut self, start: D, end: D) -> Result<TradingCalendar, DataError> {
        let provider = &self.provider;
        self.calendar
            .get(|s, e| provider.get_trade_days(s, e), start, end)
    }

    /// Securities known to the provider, optionally filtered by kind.
    pub fn list_securities(&self, kinds: Option<&[String]>) -> Result<Vec<SecurityInfo>, DataError> {
        self.provider.list_securities(kinds)
    }

    /// Bring one symbol up to date for `[start, end]`.
    ///
    /// Daily series with `use_missing_ranges` only request trading days not
    /// already stored; every other combination requests all trading days in
    /// the range. Never panics or returns an error: failures are folded into
    /// the returned outcome.
    pub fn fetch_symbol<D: ToUtcDate>(
        &mut self,
        symbol: &str,
        start: D,
        end: D,
        freq: Frequency,
        use_missing_ranges: bool,
    ) -> FetchResult {
        let calendar = match self.trade_days(start, end) {
            Ok(calendar) => calendar,
            Err(e) => {
                self.observer.on_symbol_error(symbol, &e);
                return FetchResult::failed(symbol, 0, 0, &e);
            }
        };
        if calendar.is_empty() {
            return FetchResult::skip(symbol, SkipReason::NoTradingDays);
        }

        let dates = if freq.is_daily() && use_missing_ranges {
            match self.unstored_days(symbol, freq, &calendar) {
                Ok(dates) => dates,
                Err(e) => {
                    self.observer.on_symbol_error(symbol, &e);
                    return FetchResult::failed(symbol, 0, 0, &e);
                }
            }
        } else {
            calendar.into_days()
        };
        if dates.is_empty() {
            return FetchResult::skip(symbol, SkipReason::UpToDate);
        }

        let ranges = chunk_dates(&dates, self.chunking.max_days(freq));
        let chunks = ranges.len();
        let mut fetched_rows = 0;

        for range in ranges {
            self.observer.on_chunk_start(symbol, freq, range);
            let stored = self
                .provider
                .get_price(symbol, range, freq)
                .and_then(|bars| {
                    let suspect = bars.iter().filter(|b| !b.is_sane()).count();
                    if suspect > 0 {
                        self.observer.on_suspect_bars(symbol, freq, range, suspect);
                    }
                    if !bars.is_empty() {
                        self.store.upsert(symbol, freq, &bars)?;
                    }
                    Ok(bars.len())
                });

            match stored {
                Ok(0) => self.observer.on_chunk_empty(symbol, freq, range),
                Ok(rows) => {
                    fetched_rows += rows;
                    self.observer.on_chunk_stored(symbol, freq, range, rows);
                }
                Err(e) => {
                    self.observer.on_chunk_error(symbol, freq, range, &e);
                    return FetchResult::failed(symbol, fetched_rows, chunks, &e);
                }
            }
        }

        FetchResult {
            symbol: symbol.to_string(),
            fetched_rows,
            chunks,
            outcome: FetchOutcome::Success,
        }
    }

    /// Run [`fetch_symbol`](Self::fetch_symbol) for each symbol in order.
    ///
    /// One symbol's failure never stops the batch.
    pub fn fetch_symbols<S, D>(
        &mut self,
        symbols: &[S],
        start: D,
        end: D,
        freq: Frequency,
        use_missing_ranges: bool,
    ) -> Vec<FetchResult>
    where
        S: AsRef<str>,
        D: ToUtcDate,
    {
        let (start, end) = (start.to_utc_date(), end.to_utc_date());
        let total = symbols.len();
        let mut results = Vec::with_capacity(total);

        for (i, symbol) in symbols.iter().enumerate() {
            let symbol = symbol.as_ref();
            self.observer.on_symbol_start(symbol, i, total);
            let result = self.fetch_symbol(symbol, start, end, freq, use_missing_ranges);
            self.observer.on_symbol_complete(&result, i, total);
            results.push(result);
        }

        self.observer
            .on_batch_complete(&SyncSummary::from_results(&results));
        results
    }

    /// Trading days in `calendar` with no stored bar dated that UTC day.
    fn unstored_days(
        &self,
        symbol: &str,
        freq: Frequency,
        calendar: &TradingCalendar,
    ) -> Result<Vec<NaiveDate>, DataError> {
        let stored: BTreeSet<NaiveDate> = self
            .store
            .load(symbol, freq)?
            .iter()
            .map(|b| b.date())
            .collect();
        Ok(calendar
            .into_iter()
            .copied()
            .filter(|d| !stored.contains(d))
            .collect())
    }
}
