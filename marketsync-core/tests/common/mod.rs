//! Scripted in-memory provider and helpers shared by integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use marketsync_core::data::{DataError, DataProvider, FetchResult, SyncObserver, SyncSummary};
use marketsync_core::domain::{Bar, Frequency, Range, SecurityInfo};
use marketsync_core::time;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Every Monday..Friday in `[start, end]`.
pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|x| *x <= end)
        .filter(|x| x.weekday().number_from_monday() <= 5)
        .collect()
}

pub fn daily_bar(symbol: &str, date: NaiveDate, close: f64) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        timestamp: time::utc_midnight(date),
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
        turnover: close * 1_000.0,
        extra: BTreeMap::new(),
    }
}

/// Provider with a fixed trading calendar that synthesizes bars for every
/// trading day it is asked about, and can be told to fail.
pub struct MockProvider {
    name: String,
    trade_days: BTreeSet<NaiveDate>,
    /// Days with no data (suspension): present in the calendar, absent from prices.
    empty_days: BTreeSet<NaiveDate>,
    /// Days whose bars come back with a blank close.
    void_days: BTreeSet<NaiveDate>,
    /// 1-based `get_price` call numbers that fail.
    failing_calls: BTreeSet<usize>,
    failing_symbols: BTreeSet<String>,
    fail_trade_days: bool,
    bars_per_session: usize,
    price_calls: AtomicUsize,
    trade_day_calls: AtomicUsize,
    list_calls: AtomicUsize,
    requests: Mutex<Vec<(String, Range<NaiveDate>, Frequency)>>,
    securities: Vec<SecurityInfo>,
}

impl MockProvider {
    pub fn new(trade_days: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            name: "mock".into(),
            trade_days: trade_days.into_iter().collect(),
            empty_days: BTreeSet::new(),
            void_days: BTreeSet::new(),
            failing_calls: BTreeSet::new(),
            failing_symbols: BTreeSet::new(),
            fail_trade_days: false,
            bars_per_session: 3,
            price_calls: AtomicUsize::new(0),
            trade_day_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            securities: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.failing_calls.insert(call);
        self
    }

    pub fn failing_symbol(mut self, symbol: &str) -> Self {
        self.failing_symbols.insert(symbol.to_string());
        self
    }

    pub fn failing_trade_days(mut self) -> Self {
        self.fail_trade_days = true;
        self
    }

    pub fn empty_on(mut self, day: NaiveDate) -> Self {
        self.empty_days.insert(day);
        self
    }

    pub fn void_on(mut self, day: NaiveDate) -> Self {
        self.void_days.insert(day);
        self
    }

    pub fn with_securities(mut self, securities: Vec<SecurityInfo>) -> Self {
        self.securities = securities;
        self
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    pub fn trade_day_calls(&self) -> usize {
        self.trade_day_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Every `get_price` request in call order.
    pub fn requests(&self) -> Vec<(String, Range<NaiveDate>, Frequency)> {
        self.requests.lock().unwrap().clone()
    }

    fn session_bars(&self, symbol: &str, day: NaiveDate, freq: Frequency) -> Vec<Bar> {
        let close = if self.void_days.contains(&day) {
            f64::NAN
        } else {
            100.0 + day.ordinal() as f64
        };
        match freq {
            Frequency::Daily => vec![daily_bar(symbol, day, close)],
            Frequency::Minutes(n) => {
                let open: DateTime<Utc> = time::utc_midnight(day) + Duration::minutes(90);
                (0..self.bars_per_session)
                    .map(|k| {
                        let mut bar = daily_bar(symbol, day, close + k as f64);
                        bar.timestamp = open + Duration::minutes(i64::from(n) * k as i64);
                        bar
                    })
                    .collect()
            }
        }
    }
}

impl DataProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_price(
        &self,
        symbol: &str,
        range: Range<NaiveDate>,
        freq: Frequency,
    ) -> Result<Vec<Bar>, DataError> {
        let call = self.price_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap()
            .push((symbol.to_string(), range, freq));

        if self.failing_calls.contains(&call) || self.failing_symbols.contains(symbol) {
            return Err(DataError::NetworkUnreachable(format!("scripted failure on call {call}")));
        }

        Ok(self
            .trade_days
            .range(range.start()..=range.end())
            .filter(|day| !self.empty_days.contains(day))
            .flat_map(|day| self.session_bars(symbol, *day, freq))
            .collect())
    }

    fn get_trade_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, DataError> {
        self.trade_day_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_trade_days {
            return Err(DataError::CalendarError("calendar endpoint down".into()));
        }
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.trade_days.range(start..=end).copied().collect())
    }

    fn list_securities(&self, kinds: Option<&[String]>) -> Result<Vec<SecurityInfo>, DataError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .securities
            .iter()
            .filter(|s| kinds.map_or(true, |k| s.matches_kinds(k)))
            .cloned()
            .collect())
    }
}

/// Observer that records a line per event, for asserting on event order.
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SyncObserver for RecordingObserver {
    fn on_calendar_refresh(&self, provider: &str, start: NaiveDate, end: NaiveDate) {
        self.push(format!("calendar_refresh {provider} {start} {end}"));
    }

    fn on_symbol_start(&self, symbol: &str, index: usize, total: usize) {
        self.push(format!("symbol_start {symbol} {index}/{total}"));
    }

    fn on_chunk_stored(&self, symbol: &str, _freq: Frequency, range: Range<NaiveDate>, rows: usize) {
        self.push(format!("chunk_stored {symbol} {range} {rows}"));
    }

    fn on_chunk_empty(&self, symbol: &str, _freq: Frequency, range: Range<NaiveDate>) {
        self.push(format!("chunk_empty {symbol} {range}"));
    }

    fn on_suspect_bars(&self, symbol: &str, _freq: Frequency, range: Range<NaiveDate>, count: usize) {
        self.push(format!("suspect_bars {symbol} {range} {count}"));
    }

    fn on_chunk_error(&self, symbol: &str, _freq: Frequency, range: Range<NaiveDate>, _error: &DataError) {
        self.push(format!("chunk_error {symbol} {range}"));
    }

    fn on_symbol_error(&self, symbol: &str, _error: &DataError) {
        self.push(format!("symbol_error {symbol}"));
    }

    fn on_partition_written(&self, symbol: &str, _freq: Frequency, year: i32, rows: usize) {
        self.push(format!("partition_written {symbol} {year} {rows}"));
    }

    fn on_symbol_complete(&self, result: &FetchResult, _index: usize, _total: usize) {
        self.push(format!("symbol_complete {} {}", result.symbol, result.status_label()));
    }

    fn on_batch_complete(&self, summary: &SyncSummary) {
        self.push(format!(
            "batch_complete {} ok={} skipped={} failed={}",
            summary.total, summary.succeeded, summary.skipped, summary.failed
        ));
    }
}
