//! UTC normalization helpers.
//!
//! Every comparison in the sync core happens on UTC values: naive inputs are
//! taken to already be UTC, zoned inputs are converted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// UTC calendar date of a zoned timestamp.
pub fn utc_date<Z: TimeZone>(dt: &DateTime<Z>) -> NaiveDate {
    dt.with_timezone(&Utc).date_naive()
}

/// Anything that names a UTC calendar date: plain dates, naive timestamps
/// (taken as UTC) and zoned timestamps (converted to UTC).
pub trait ToUtcDate {
    fn to_utc_date(&self) -> NaiveDate;
}

impl ToUtcDate for NaiveDate {
    fn to_utc_date(&self) -> NaiveDate {
        *self
    }
}

impl ToUtcDate for NaiveDateTime {
    fn to_utc_date(&self) -> NaiveDate {
        self.date()
    }
}

impl<Z: TimeZone> ToUtcDate for DateTime<Z> {
    fn to_utc_date(&self) -> NaiveDate {
        utc_date(self)
    }
}

/// 00:00:00 UTC on `date`.
pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Localize a naive exchange-local timestamp and convert it to UTC.
///
/// Ambiguous local times (DST fold) resolve to the earlier instant; times that
/// do not exist in `tz` (DST gap) yield `None`.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
