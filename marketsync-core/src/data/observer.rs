//! Sync event observers.
//!
//! Components never log through a global; they report to an injected
//! [`SyncObserver`]. Every method has a no-op default so an observer only
//! implements the events it cares about.

use super::fetcher::{FetchOutcome, FetchResult, SyncSummary};
use super::provider::DataError;
use crate::domain::{Frequency, Range};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;

/// Receives progress and error events from the calendar cache, the store and
/// the fetch orchestrator.
#[allow(unused_variables)]
pub trait SyncObserver: Send + Sync {
    /// The calendar cache did not cover `[start, end]` and is calling the loader.
    fn on_calendar_refresh(&self, provider: &str, start: NaiveDate, end: NaiveDate) {}

    /// The persisted calendar could not be read and is treated as empty.
    fn on_calendar_unreadable(&self, path: &Path, error: &DataError) {}

    /// A batch is about to process `symbol` (0-based `index` of `total`).
    fn on_symbol_start(&self, symbol: &str, index: usize, total: usize) {}

    fn on_chunk_start(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>) {}

    /// The provider returned no rows for the chunk.
    fn on_chunk_empty(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>) {}

    fn on_chunk_stored(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>, rows: usize) {}

    /// `count` bars of the chunk failed the OHLC sanity check. They are
    /// stored as delivered.
    fn on_suspect_bars(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>, count: usize) {}

    /// A chunk failed; no later chunk of this symbol will be requested.
    fn on_chunk_error(
        &self,
        symbol: &str,
        freq: Frequency,
        range: Range<NaiveDate>,
        error: &DataError,
    ) {
    }

    /// A symbol failed before any chunk was requested (calendar or store read).
    fn on_symbol_error(&self, symbol: &str, error: &DataError) {}

    /// A partition file was rewritten and now holds `rows` bars.
    fn on_partition_written(&self, symbol: &str, freq: Frequency, year: i32, rows: usize) {}

    fn on_symbol_complete(&self, result: &FetchResult, index: usize, total: usize) {}

    fn on_batch_complete(&self, summary: &SyncSummary) {}
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SyncObserver for NullObserver {}

/// Shared no-op observer, the default for every component.
pub fn null_observer() -> Arc<dyn SyncObserver> {
    Arc::new(NullObserver)
}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_calendar_refresh(&self, provider: &str, start: NaiveDate, end: NaiveDate) {
        tracing::info!(provider, %start, %end, "refreshing trading calendar cache");
    }

    fn on_calendar_unreadable(&self, path: &Path, error: &DataError) {
        tracing::warn!(path = %path.display(), %error, "calendar cache unreadable, rebuilding");
    }

    fn on_chunk_start(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>) {
        tracing::info!(symbol, %freq, %range, "fetching chunk");
    }

    fn on_chunk_empty(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>) {
        tracing::info!(symbol, %freq, %range, "empty result for chunk");
    }

    fn on_chunk_stored(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>, rows: usize) {
        tracing::debug!(symbol, %freq, %range, rows, "chunk stored");
    }

    fn on_suspect_bars(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>, count: usize) {
        tracing::warn!(symbol, %freq, %range, count, "bars failed OHLC sanity check");
    }

    fn on_chunk_error(
        &self,
        symbol: &str,
        freq: Frequency,
        range: Range<NaiveDate>,
        error: &DataError,
    ) {
        tracing::error!(symbol, %freq, %range, %error, "fetch failed");
    }

    fn on_symbol_error(&self, symbol: &str, error: &DataError) {
        tracing::error!(symbol, %error, "sync failed before fetching");
    }

    fn on_partition_written(&self, symbol: &str, freq: Frequency, year: i32, rows: usize) {
        tracing::debug!(symbol, %freq, year, rows, "partition written");
    }

    fn on_symbol_complete(&self, result: &FetchResult, index: usize, total: usize) {
        match &result.outcome {
            FetchOutcome::Skipped(reason) => tracing::info!(
                symbol = %result.symbol,
                ?reason,
                "[{}/{}] skipped",
                index + 1,
                total
            ),
            FetchOutcome::Success => tracing::info!(
                symbol = %result.symbol,
                rows = result.fetched_rows,
                chunks = result.chunks,
                "[{}/{}] synced",
                index + 1,
                total
            ),
            FetchOutcome::PartialError { message } => tracing::warn!(
                symbol = %result.symbol,
                rows = result.fetched_rows,
                chunks = result.chunks,
                error = %message,
                "[{}/{}] partial failure",
                index + 1,
                total
            ),
        }
    }

    fn on_batch_complete(&self, summary: &SyncSummary) {
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            rows = summary.rows,
            "sync complete"
        );
    }
}

/// Simple progress reporter that prints one line per symbol to stdout.
pub struct StdoutProgress;

impl SyncObserver for StdoutProgress {
    fn on_symbol_complete(&self, result: &FetchResult, index: usize, total: usize) {
        println!(
            "[{}/{}] {} -> rows={} chunks={} status={}",
            index + 1,
            total,
            result.symbol,
            result.fetched_rows,
            result.chunks,
            result.status_label()
        );
    }

    fn on_batch_complete(&self, summary: &SyncSummary) {
        println!(
            "\nSync complete: {}/{} ok ({} skipped), {} failed, {} rows",
            summary.succeeded + summary.skipped,
            summary.total,
            summary.skipped,
            summary.failed,
            summary.rows
        );
    }
}

/// Fans every event out to several observers in order.
pub struct ObserverSet(pub Vec<Arc<dyn SyncObserver>>);

impl SyncObserver for ObserverSet {
    fn on_calendar_refresh(&self, provider: &str, start: NaiveDate, end: NaiveDate) {
        self.0.iter().for_each(|o| o.on_calendar_refresh(provider, start, end));
    }

    fn on_calendar_unreadable(&self, path: &Path, error: &DataError) {
        self.0.iter().for_each(|o| o.on_calendar_unreadable(path, error));
    }

    fn on_symbol_start(&self, symbol: &str, index: usize, total: usize) {
        self.0.iter().for_each(|o| o.on_symbol_start(symbol, index, total));
    }

    fn on_chunk_start(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>) {
        self.0.iter().for_each(|o| o.on_chunk_start(symbol, freq, range));
    }

    fn on_chunk_empty(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>) {
        self.0.iter().for_each(|o| o.on_chunk_empty(symbol, freq, range));
    }

    fn on_chunk_stored(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>, rows: usize) {
        self.0
            .iter()
            .for_each(|o| o.on_chunk_stored(symbol, freq, range, rows));
    }

    fn on_suspect_bars(&self, symbol: &str, freq: Frequency, range: Range<NaiveDate>, count: usize) {
        self.0
            .iter()
            .for_each(|o| o.on_suspect_bars(symbol, freq, range, count));
    }

    fn on_chunk_error(
        &self,
        symbol: &str,
        freq: Frequency,
        range: Range<NaiveDate>,
        error: &DataError,
    ) {
        self.0
            .iter()
            .for_each(|o| o.on_chunk_error(symbol, freq, range, error));
    }

    fn on_symbol_error(&self, symbol: &str, error: &DataError) {
        self.0.iter().for_each(|o| o.on_symbol_error(symbol, error));
    }

    fn on_partition_written(&self, symbol: &str, freq: Frequency, year: i32, rows: usize) {
        self.0
            .iter()
            .for_each(|o| o.on_partition_written(symbol, freq, year, rows));
    }

    fn on_symbol_complete(&self, result: &FetchResult, index: usize, total: usize) {
        self.0
            .iter()
            .for_each(|o| o.on_symbol_complete(result, index, total));
    }

    fn on_batch_complete(&self, summary: &SyncSummary) {
        self.0.iter().for_each(|o| o.on_batch_complete(summary));
    }
}
