//! Grouping of missing dates into bounded, contiguous fetch requests.

use crate::domain::{Frequency, Range};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Maximum chunk lengths for daily and intraday fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Longest daily chunk, in days.
    pub daily_max_days: usize,
    /// Longest intraday chunk, in days (derived from a minute budget).
    pub intraday_max_days: usize,
}

impl ChunkConfig {
    /// Build from a daily day budget and an intraday minute budget.
    ///
    /// The minute budget is rounded down to whole days; both limits are at
    /// least one day.
    pub fn new(daily_max_days: usize, intraday_max_minutes: u32) -> Self {
        Self {
            daily_max_days: daily_max_days.max(1),
            intraday_max_days: ((intraday_max_minutes / MINUTES_PER_DAY) as usize).max(1),
        }
    }

    pub fn max_days(&self, freq: Frequency) -> usize {
        if freq.is_daily() {
            self.daily_max_days
        } else {
            self.intraday_max_days
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::new(366, 3 * MINUTES_PER_DAY)
    }
}

/// Split dates into maximal runs of consecutive calendar days, each at most
/// `max_len` days long.
///
/// Input order and duplicates do not matter. A run breaks on any missing
/// calendar day, so consecutive trading days across a weekend form separate
/// chunks.
pub fn chunk_dates(dates: &[NaiveDate], max_len: usize) -> Vec<Range<NaiveDate>> {
    let max_len = max_len.max(1);
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let Some((&first, rest)) = sorted.split_first() else {
        return Vec::new();
    };

    let mut chunks = Vec::new();
    let mut start = first;
    let mut prev = first;
    let mut len = 1;

    for &current in rest {
        if current - prev == Duration::days(1) && len < max_len {
            prev = current;
            len += 1;
            continue;
        }
        chunks.push(span(start, prev));
        start = current;
        prev = current;
        len = 1;
    }
    chunks.push(span(start, prev));

    chunks
}

/// `start <= end` always holds for runs built above.
fn span(start: NaiveDate, end: NaiveDate) -> Range<NaiveDate> {
    Range::new(start, end).unwrap_or(Range::point(start))
}
