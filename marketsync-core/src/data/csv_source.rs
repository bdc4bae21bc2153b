//! CSV drop-folder provider.
//!
//! Serves bars from a directory of `{SYMBOL}.csv` files with the header
//! `code,name,time_key,open,close,high,low,volume,turnover` (turnover
//! optional). Any other numeric column is carried as an extra field.
//! Naive `time_key` values are exchange-local and localized in the configured
//! timezone; values with an explicit offset are converted directly.
//!
//! A file is served at its native frequency: files whose timestamps all fall
//! on local midnight answer `1d` requests, everything else answers intraday
//! requests. Nothing is resampled.

use super::provider::{DataError, DataProvider};
use crate::domain::{Bar, Frequency, Range, SecurityInfo};
use crate::time;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const TIME_COLUMNS: [&str; 2] = ["time_key", "timestamp"];
const TEXT_COLUMNS: [&str; 4] = ["code", "name", "time_key", "timestamp"];
const PRICE_COLUMNS: [&str; 6] = ["open", "high", "low", "close", "volume", "turnover"];
/// Extras always present on every row, NaN when blank or unparseable.
const KNOWN_EXTRAS: [&str; 3] = ["change_rate", "pe_ratio", "turnover_rate"];

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// One parsed symbol file.
#[derive(Debug)]
struct SymbolFile {
    name: Option<String>,
    bars: Vec<Bar>,
    daily: bool,
}

/// Provider over a local directory of CSV files.
pub struct CsvProvider {
    name: String,
    source_dir: PathBuf,
    tz: Tz,
}

impl CsvProvider {
    pub fn new(name: &str, source_dir: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            name: name.to_string(),
            source_dir: source_dir.into(),
            tz,
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.source_dir.join(format!("{symbol}.csv"))
    }

    /// Symbols with a `.csv` file in the source directory, sorted.
    fn symbols(&self) -> Result<Vec<String>, DataError> {
        let entries = fs::read_dir(&self.source_dir).map_err(|e| {
            DataError::IoError(format!("read dir {}: {e}", self.source_dir.display()))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DataError::IoError(format!("dir entry: {e}")))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    fn read(&self, symbol: &str) -> Result<SymbolFile, DataError> {
        let path = self.symbol_path(symbol);
        if !path.is_file() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        read_symbol_file(&path, symbol, self.tz)
    }
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_price(
        &self,
        symbol: &str,
        range: Range<NaiveDate>,
        freq: Frequency,
    ) -> Result<Vec<Bar>, DataError> {
        let file = self.read(symbol)?;
        if !file.bars.is_empty() && file.daily != freq.is_daily() {
            return Err(DataError::UnsupportedFrequency {
                provider: self.name.clone(),
                freq,
            });
        }
        Ok(file
            .bars
            .into_iter()
            .filter(|b| range.contains(b.date()))
            .collect())
    }

    /// Every date on which any file has a row.
    fn get_trade_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, DataError> {
        let Some(range) = Range::new(start, end) else {
            return Ok(Vec::new());
        };
        let mut days = BTreeSet::new();
        for symbol in self.symbols()? {
            let file = read_symbol_file(&self.symbol_path(&symbol), &symbol, self.tz)?;
            days.extend(file.bars.iter().map(Bar::date).filter(|d| range.contains(*d)));
        }
        Ok(days.into_iter().collect())
    }

    /// One entry per file; `name` comes from the first row. The CSV layout
    /// carries no security type, so every file passes a `kinds` filter.
    fn list_securities(&self, kinds: Option<&[String]>) -> Result<Vec<SecurityInfo>, DataError> {
        let mut securities = Vec::new();
        for symbol in self.symbols()? {
            let file = read_symbol_file(&self.symbol_path(&symbol), &symbol, self.tz)?;
            let mut info = SecurityInfo::new(symbol);
            info.name = file.name;
            info.start_date = file.bars.first().map(Bar::date);
            info.end_date = file.bars.last().map(Bar::date);
            if kinds.map_or(true, |k| info.matches_kinds(k)) {
                securities.push(info);
            }
        }
        Ok(securities)
    }
}

/// A parsed `time_key` cell.
enum Stamp {
    Naive(NaiveDateTime),
    Aware(DateTime<Utc>),
}

fn parse_stamp(raw: &str) -> Option<Stamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(Stamp::Aware(dt.with_timezone(&Utc)));
    }
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(Stamp::Naive(dt));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| Stamp::Naive(d.and_time(NaiveTime::MIN)))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

fn read_symbol_file(path: &Path, symbol: &str, tz: Tz) -> Result<SymbolFile, DataError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| DataError::CsvError(format!("open {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| DataError::CsvError(format!("{}: header: {e}", path.display())))?
        .clone();
    let index_of = |name: &str| headers.iter().position(|h| h.trim() == name);

    let time_idx = TIME_COLUMNS
        .iter()
        .find_map(|c| index_of(*c))
        .ok_or_else(|| DataError::CsvError(format!("{}: missing column 'time_key'", path.display())))?;
    let mut price_idx = BTreeMap::new();
    for column in PRICE_COLUMNS {
        match index_of(column) {
            Some(i) => {
                price_idx.insert(column, i);
            }
            None if column == "turnover" => {}
            None => {
                return Err(DataError::CsvError(format!(
                    "{}: missing column '{column}'",
                    path.display()
                )))
            }
        }
    }
    let name_idx = index_of("name");
    let extra_idx: Vec<(String, usize)> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .filter(|(h, _)| !TEXT_COLUMNS.contains(&h.as_str()) && !PRICE_COLUMNS.contains(&h.as_str()))
        .collect();

    let mut name = None;
    let mut rows = Vec::new();
    let mut daily = true;

    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| DataError::CsvError(format!("{}: row {}: {e}", path.display(), line + 1)))?;

        if name.is_none() {
            name = name_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }

        let raw_time = record.get(time_idx).unwrap_or_default();
        let stamp = parse_stamp(raw_time).ok_or_else(|| {
            DataError::CsvError(format!(
                "{}: row {}: unparseable time '{raw_time}'",
                path.display(),
                line + 1
            ))
        })?;
        if let Stamp::Naive(naive) = &stamp {
            daily &= naive.time() == NaiveTime::MIN;
        } else {
            daily = false;
        }

        let value = |column: &str| {
            price_idx
                .get(column)
                .and_then(|&i| record.get(i))
                .and_then(parse_number)
                .unwrap_or(f64::NAN)
        };

        let mut extra = BTreeMap::new();
        for (column, i) in &extra_idx {
            let parsed = record.get(*i).and_then(parse_number);
            match parsed {
                Some(v) => {
                    extra.insert(column.clone(), v);
                }
                None if KNOWN_EXTRAS.contains(&column.as_str()) => {
                    extra.insert(column.clone(), f64::NAN);
                }
                None => {}
            }
        }

        rows.push((
            stamp,
            Bar {
                symbol: symbol.to_string(),
                timestamp: DateTime::<Utc>::MIN_UTC,
                open: value("open"),
                high: value("high"),
                low: value("low"),
                close: value("close"),
                volume: value("volume"),
                turnover: value("turnover"),
                extra,
            },
        ));
    }

    let mut bars = Vec::with_capacity(rows.len());
    for (line, (stamp, mut bar)) in rows.into_iter().enumerate() {
        let timestamp = match stamp {
            Stamp::Naive(naive) if daily => Some(time::utc_midnight(naive.date())),
            Stamp::Naive(naive) => time::localize(naive, tz),
            Stamp::Aware(utc) => Some(utc),
        };
        bar.timestamp = timestamp.ok_or_else(|| {
            DataError::CsvError(format!(
                "{}: row {}: local time does not exist in {tz}",
                path.display(),
                line + 1
            ))
        })?;
        bars.push(bar);
    }
    bars.sort_by_key(|b| b.timestamp);

    Ok(SymbolFile { name, bars, daily })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DAILY: &str = "\
code,name,time_key,open,close,high,low,volume,turnover,change_rate,pe_ratio,turnover_rate
600000,PF Bank,2024-01-03,10.1,10.3,10.4,10.0,1000,10300,1.5,5.2,0.3
600000,PF Bank,2024-01-02,10.0,10.1,10.2,9.9,900,9090,n/a,5.1,0.2
";

    const MINUTE: &str = "\
code,name,time_key,open,close,high,low,volume,turnover
600000,PF Bank,2024-01-02 09:31:00,10.0,10.1,10.2,9.9,100,1010
600000,PF Bank,2024-01-02 09:32:00,10.1,10.0,10.1,10.0,50,505
";

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn provider(files: &[(&str, &str)]) -> (tempfile::TempDir, CsvProvider) {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            fs::write(dir.path().join(name), body).unwrap();
        }
        let provider = CsvProvider::new("csv", dir.path(), chrono_tz::Asia::Shanghai);
        (dir, provider)
    }

    #[test]
    fn daily_file_sorted_at_utc_midnight() {
        let (_dir, p) = provider(&[("600000.XSHG.csv", DAILY)]);
        let bars = p
            .get_price("600000.XSHG", Range::new(d(1, 1), d(1, 31)).unwrap(), Frequency::Daily)
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, time::utc_midnight(d(1, 2)));
        assert_eq!(bars[1].close, 10.3);
        assert!(bars[0].extra["change_rate"].is_nan());
        assert_eq!(bars[1].extra["pe_ratio"], 5.2);
    }

    #[test]
    fn range_filter_is_inclusive() {
        let (_dir, p) = provider(&[("A.csv", DAILY)]);
        let bars = p
            .get_price("A", Range::point(d(1, 3)), Frequency::Daily)
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date(), d(1, 3));
    }

    #[test]
    fn intraday_rows_are_localized() {
        let (_dir, p) = provider(&[("A.csv", MINUTE)]);
        let bars = p
            .get_price("A", Range::point(d(1, 2)), Frequency::Minutes(1))
            .unwrap();
        assert_eq!(bars[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 1, 31, 0).unwrap());
        assert!(bars[0].extra.is_empty());
    }

    #[test]
    fn frequency_mismatch_is_unsupported() {
        let (_dir, p) = provider(&[("A.csv", MINUTE)]);
        let err = p.get_price("A", Range::point(d(1, 2)), Frequency::Daily);
        assert!(matches!(err, Err(DataError::UnsupportedFrequency { .. })));
    }

    #[test]
    fn missing_file_is_symbol_not_found() {
        let (_dir, p) = provider(&[]);
        let err = p.get_price("NOPE", Range::point(d(1, 2)), Frequency::Daily);
        assert!(matches!(err, Err(DataError::SymbolNotFound { .. })));
    }

    #[test]
    fn trade_days_union_across_files() {
        let other = "code,name,time_key,open,close,high,low,volume\nB,B,2024-01-04,1,1,1,1,1\n";
        let (_dir, p) = provider(&[("A.csv", DAILY), ("B.csv", other)]);
        assert_eq!(
            p.get_trade_days(d(1, 1), d(1, 31)).unwrap(),
            vec![d(1, 2), d(1, 3), d(1, 4)]
        );
        assert_eq!(p.get_trade_days(d(1, 3), d(1, 3)).unwrap(), vec![d(1, 3)]);
    }

    #[test]
    fn list_securities_reads_names() {
        let (_dir, p) = provider(&[("600000.XSHG.csv", DAILY), ("notes.txt", "x")]);
        let list = p.list_securities(None).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].symbol, "600000.XSHG");
        assert_eq!(list[0].name.as_deref(), Some("PF Bank"));
        assert_eq!(list[0].start_date, Some(d(1, 2)));
        let stocks = p.list_securities(Some(&["stock".to_string()])).unwrap();
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].kind, None);
    }

    #[test]
    fn bad_time_reports_row() {
        let body = "code,name,time_key,open,close,high,low,volume\nA,A,yesterday,1,1,1,1,1\n";
        let (_dir, p) = provider(&[("A.csv", body)]);
        let err = p
            .get_price("A", Range::point(d(1, 2)), Frequency::Daily)
            .unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}
