//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over market data vendors (Yahoo Finance,
//! CSV drops, ...) so the sync orchestrator never depends on a concrete vendor
//! and tests can script one.

use crate::domain::{Bar, Frequency, Range, SecurityInfo};
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI output and to be folded into a
/// per-symbol fetch outcome without losing the cause.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider '{provider}' does not support {operation}")]
    Unsupported {
        provider: String,
        operation: String,
    },

    #[error("unsupported frequency for provider '{provider}': {freq}")]
    UnsupportedFrequency { provider: String, freq: Frequency },

    #[error("calendar error: {0}")]
    CalendarError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("storage I/O error: {0}")]
    IoError(String),

    #[error("csv error: {0}")]
    CsvError(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Trait for market data vendors.
///
/// Implementations handle the specifics of talking to one vendor, including
/// authentication, throttling and retries. The calendar cache and the
/// partitioned store sit above this trait; providers know nothing about them.
pub trait DataProvider: Send + Sync {
    /// Stable provider name; keys the calendar and securities cache files.
    fn name(&self) -> &str;

    /// Fetch bars for every trading day in `range` (inclusive, whole UTC days).
    ///
    /// An empty vector means the vendor has nothing for the range (suspended
    /// symbol, holiday span) and is not an error.
    fn get_price(
        &self,
        symbol: &str,
        range: Range<NaiveDate>,
        freq: Frequency,
    ) -> Result<Vec<Bar>, DataError>;

    /// Fetch several symbols one after another and concatenate the results.
    fn get_price_batch(
        &self,
        symbols: &[&str],
        range: Range<NaiveDate>,
        freq: Frequency,
    ) -> Result<Vec<Bar>, DataError> {
        let mut all = Vec::new();
        for symbol in symbols {
            all.extend(self.get_price(symbol, range, freq)?);
        }
        Ok(all)
    }

    /// Trading days between `start` and `end` inclusive, as UTC dates.
    fn get_trade_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, DataError>;

    /// List securities, optionally restricted to the given kinds.
    fn list_securities(&self, _kinds: Option<&[String]>) -> Result<Vec<SecurityInfo>, DataError> {
        Err(DataError::Unsupported {
            provider: self.name().to_string(),
            operation: "list_securities".into(),
        })
    }
}
