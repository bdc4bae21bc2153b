//! Inclusive ranges over dates or timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive `[start, end]` range. Construction enforces `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range<T> {
    start: T,
    end: T,
}

impl<T: Ord + Copy> Range<T> {
    /// Returns `None` when `start > end`.
    pub fn new(start: T, end: T) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Single-point range.
    pub fn point(at: T) -> Self {
        Self { start: at, end: at }
    }

    pub fn start(&self) -> T {
        self.start
    }

    pub fn end(&self) -> T {
        self.end
    }

    pub fn contains(&self, value: T) -> bool {
        self.start <= value && value <= self.end
    }
}

impl<T: fmt::Display> fmt::Display for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn rejects_inverted() {
        assert!(Range::new(d(5), d(2)).is_none());
        assert!(Range::new(d(2), d(2)).is_some());
    }

    #[test]
    fn contains_is_inclusive() {
        let r = Range::new(d(2), d(5)).unwrap();
        assert!(r.contains(d(2)));
        assert!(r.contains(d(5)));
        assert!(!r.contains(d(6)));
    }

    #[test]
    fn displays_both_ends() {
        assert_eq!(Range::point(d(3)).to_string(), "2024-01-03 -> 2024-01-03");
    }
}
