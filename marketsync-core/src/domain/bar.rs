//! Bar: the fundamental market data unit.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OHLCV bar for a single symbol at a single UTC timestamp.
///
/// Daily bars carry the trading date at 00:00:00 UTC. `turnover` is NaN when
/// the vendor does not report it. Vendor-specific numeric columns (adjusted
/// close, turnover rate, ...) travel in `extra` and are persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl Bar {
    /// UTC calendar date of this bar.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// UTC calendar year, which is also the partition key.
    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }

    /// True when the vendor left any OHLC price blank (NaN).
    pub fn is_void(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .any(|p| p.is_nan())
    }

    /// Prices are present, positive, and open/close sit inside `[low, high]`.
    pub fn is_sane(&self) -> bool {
        let band = self.low..=self.high;
        !self.is_void() && self.low > 0.0 && band.contains(&self.open) && band.contains(&self.close)
    }
}
