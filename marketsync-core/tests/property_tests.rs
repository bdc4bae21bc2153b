//! Property tests for sync invariants.
//!
//! Uses proptest to verify:
//! 1. Chunking partitions the input into maximal, bounded runs
//! 2. The calendar cache only grows and answers covered ranges from disk
//! 3. Gap detection is the exact complement of stored days
//! 4. Upsert is first-wins and idempotent

mod common;

use chrono::{Duration, NaiveDate};
use common::daily_bar;
use marketsync_core::data::{chunk_dates, PartitionedStore, TradingCalendarCache};
use marketsync_core::domain::Frequency;
use marketsync_core::time;
use proptest::prelude::*;
use std::cell::Cell;
use std::collections::BTreeSet;

// ── Strategies (proptest) ────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 11, 1).unwrap()
}

/// Sparse set of dates within ~4 months of a fixed origin.
fn arb_dates() -> impl Strategy<Value = Vec<NaiveDate>> {
    prop::collection::vec(0i64..120, 0..80)
        .prop_map(|offsets| offsets.into_iter().map(|o| epoch() + Duration::days(o)).collect())
}

fn arb_span() -> impl Strategy<Value = (NaiveDate, NaiveDate)> {
    (0i64..120, 0i64..40).prop_map(|(s, len)| {
        let start = epoch() + Duration::days(s);
        (start, start + Duration::days(len))
    })
}

fn days_between(start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

// ── 1. Chunking ──────────────────────────────────────────────────────

proptest! {
    /// Chunks cover exactly the input dates, are ordered, disjoint and bounded.
    #[test]
    fn chunks_reconstruct_input(dates in arb_dates(), max_len in 1usize..10) {
        let chunks = chunk_dates(&dates, max_len);
        let expected: BTreeSet<NaiveDate> = dates.iter().copied().collect();

        let mut covered = BTreeSet::new();
        for chunk in &chunks {
            let days = days_between(chunk.start(), chunk.end());
            prop_assert!(days.len() <= max_len);
            for day in days {
                prop_assert!(expected.contains(&day), "{day} is not an input date");
                prop_assert!(covered.insert(day), "{day} appears in two chunks");
            }
        }
        prop_assert_eq!(covered, expected);

        for pair in chunks.windows(2) {
            prop_assert!(pair[0].end() < pair[1].start());
        }
    }

    /// Two neighbouring chunks only touch when the first is already full.
    #[test]
    fn chunks_are_maximal(dates in arb_dates(), max_len in 1usize..10) {
        let chunks = chunk_dates(&dates, max_len);
        for pair in chunks.windows(2) {
            let adjacent = pair[1].start() - pair[0].end() == Duration::days(1);
            let full = days_between(pair[0].start(), pair[0].end()).len() == max_len;
            prop_assert!(!adjacent || full);
        }
    }
}

// ── 2. Calendar cache ────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Refreshed answers match the provider's calendar, the cache never
    /// shrinks, and a range answered once never reaches the loader again.
    #[test]
    fn calendar_cache_grows_monotonically(
        trading in arb_dates(),
        spans in prop::collection::vec(arb_span(), 1..6),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TradingCalendarCache::new(dir.path(), "prop");
        let universe: BTreeSet<NaiveDate> = trading.into_iter().collect();
        let mut previous = BTreeSet::new();

        for (start, end) in spans {
            let loader = |s: NaiveDate, e: NaiveDate| {
                Ok(universe.range(s..=e).copied().collect::<Vec<_>>())
            };
            let was_covered = cache.cached().covers(start, end);
            let got = cache.get(loader, start, end).unwrap();
            let expected: Vec<NaiveDate> = universe.range(start..=end).copied().collect();
            if was_covered {
                // Answered from the cached span: never invents a day.
                prop_assert!(got.days().iter().all(|d| universe.contains(d)));
            } else {
                prop_assert_eq!(got.days(), expected.as_slice());
            }

            let now: BTreeSet<NaiveDate> = cache.cached().days().iter().copied().collect();
            prop_assert!(now.is_superset(&previous));
            previous = now;

            if !got.is_empty() {
                let called = Cell::new(false);
                let again = cache
                    .get(
                        |_, _| {
                            called.set(true);
                            Ok(Vec::new())
                        },
                        got.first().unwrap(),
                        got.last().unwrap(),
                    )
                    .unwrap();
                prop_assert!(!called.get());
                prop_assert_eq!(again.days(), got.days());
            }
        }

        // A fresh cache over the same directory sees the persisted days.
        let mut reopened = TradingCalendarCache::new(dir.path(), "prop");
        let persisted: BTreeSet<NaiveDate> = reopened.cached().days().iter().copied().collect();
        prop_assert_eq!(persisted, previous);
    }
}

// ── 3. Gap detection ─────────────────────────────────────────────────

proptest! {
    /// Gaps and stored days partition the requested range.
    #[test]
    fn gaps_complement_stored_days(stored in arb_dates(), (start, end) in arb_span()) {
        let bars: Vec<_> = stored.iter().map(|d| daily_bar("P", *d, 10.0)).collect();
        let gaps = PartitionedStore::missing_ranges(
            &bars,
            time::utc_midnight(start),
            time::utc_midnight(end),
            Frequency::Daily,
        );

        let present: BTreeSet<NaiveDate> = stored.iter().copied().filter(|d| *d >= start && *d <= end).collect();
        let mut missing = BTreeSet::new();
        for gap in &gaps {
            prop_assert!(gap.start() <= gap.end());
            for day in days_between(gap.start().date_naive(), gap.end().date_naive()) {
                prop_assert!(!present.contains(&day), "{day} is stored but reported missing");
                prop_assert!(missing.insert(day));
            }
        }

        let all = days_between(start, end);
        let union: BTreeSet<NaiveDate> = missing.union(&present).copied().collect();
        prop_assert_eq!(union, all);
    }

    /// A fully stored range has no gaps.
    #[test]
    fn fully_stored_range_has_no_gaps((start, end) in arb_span()) {
        let bars: Vec<_> = days_between(start, end)
            .into_iter()
            .map(|d| daily_bar("P", d, 10.0))
            .collect();
        let gaps = PartitionedStore::missing_ranges(
            &bars,
            time::utc_midnight(start),
            time::utc_midnight(end),
            Frequency::Daily,
        );
        prop_assert!(gaps.is_empty());
    }
}

// ── 4. Upsert ────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Stored rows are unique per timestamp and keep the first value written.
    #[test]
    fn upsert_is_first_wins(first in arb_dates(), second in arb_dates()) {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionedStore::new(dir.path());

        let old: Vec<_> = first.iter().map(|d| daily_bar("P", *d, 10.0)).collect();
        let new: Vec<_> = second.iter().map(|d| daily_bar("P", *d, 20.0)).collect();
        store.upsert("P", Frequency::Daily, &old).unwrap();
        store.upsert("P", Frequency::Daily, &new).unwrap();
        store.upsert("P", Frequency::Daily, &new).unwrap();

        let loaded = store.load("P", Frequency::Daily).unwrap();
        let first_set: BTreeSet<NaiveDate> = first.iter().copied().collect();
        let all: BTreeSet<NaiveDate> = first_set.union(&second.iter().copied().collect()).copied().collect();

        prop_assert_eq!(loaded.len(), all.len());
        for pair in loaded.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
        for bar in &loaded {
            let expected = if first_set.contains(&bar.date()) { 10.0 } else { 20.0 };
            prop_assert_eq!(bar.close, expected);
        }
    }
}
