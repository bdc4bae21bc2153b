//! Bar sampling frequency.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sampling frequency of a bar series.
///
/// The canonical string form (`1d`, `5m`, ...) is the `freq=` key of the
/// on-disk partition layout, so aliases like `daily` and `1d` share storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    Daily,
    Minutes(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported frequency '{0}' (expected 1d, 1m, 5m, 1h, ...)")]
pub struct FrequencyParseError(pub String);

impl Frequency {
    pub fn is_daily(self) -> bool {
        matches!(self, Frequency::Daily)
    }

    /// Nominal distance between two consecutive bars.
    pub fn step(self) -> Duration {
        match self {
            Frequency::Daily => Duration::days(1),
            Frequency::Minutes(n) => Duration::minutes(i64::from(n)),
        }
    }

    /// Canonical storage key.
    pub fn key(self) -> String {
        match self {
            Frequency::Daily => "1d".to_string(),
            Frequency::Minutes(n) => format!("{n}m"),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Frequency {
    type Err = FrequencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        match norm.as_str() {
            "1d" | "d" | "day" | "daily" => return Ok(Frequency::Daily),
            "m" | "min" | "minute" | "minutes" => return Ok(Frequency::Minutes(1)),
            "h" | "1h" | "hour" | "hourly" => return Ok(Frequency::Minutes(60)),
            _ => {}
        }

        let digits = norm
            .strip_suffix("min")
            .or_else(|| norm.strip_suffix('m'))
            .map(|d| (d, 1))
            .or_else(|| norm.strip_suffix('h').map(|d| (d, 60)));

        digits
            .and_then(|(n, mult)| n.parse::<u32>().ok()?.checked_mul(mult))
            .filter(|minutes| *minutes > 0)
            .map(Frequency::Minutes)
            .ok_or_else(|| FrequencyParseError(s.to_string()))
    }
}

impl TryFrom<String> for Frequency {
    type Error = FrequencyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(freq: Frequency) -> Self {
        freq.key()
    }
}
