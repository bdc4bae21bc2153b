//! Security metadata returned by a provider's listing endpoint.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One listed security. Only `symbol` is guaranteed; the rest depends on
/// what the vendor exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub symbol: String,
    pub name: Option<String>,
    /// Security type as reported by the vendor (`stock`, `etf`, `index`, ...).
    pub kind: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl SecurityInfo {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            kind: None,
            start_date: None,
            end_date: None,
        }
    }

    /// True when `kinds` is empty, this security's kind is unknown, or
    /// `kinds` contains it.
    pub fn matches_kinds(&self, kinds: &[String]) -> bool {
        match &self.kind {
            Some(kind) if !kinds.is_empty() => kinds.iter().any(|k| k.eq_ignore_ascii_case(kind)),
            _ => true,
        }
    }
}
