//! Yahoo Finance data provider.
//!
//! Fetches daily and intraday OHLCV bars from Yahoo's v8 chart API. Handles
//! throttling, retries with exponential backoff and response parsing.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.
//! The CSV provider is the fallback when Yahoo is unavailable.

use super::provider::{DataError, DataProvider};
use super::throttle::Throttle;
use crate::config::RetryConfig;
use crate::domain::{Bar, Frequency, Range};
use crate::time;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    throttle: Throttle,
    retry: RetryConfig,
    calendar_symbol: String,
}

impl YahooProvider {
    pub fn new(throttle: Throttle, retry: RetryConfig, calendar_symbol: &str) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            throttle,
            retry,
            calendar_symbol: calendar_symbol.to_string(),
        })
    }

    /// Chart API interval for a frequency, if Yahoo serves it.
    fn interval(freq: Frequency) -> Option<&'static str> {
        match freq {
            Frequency::Daily => Some("1d"),
            Frequency::Minutes(1) => Some("1m"),
            Frequency::Minutes(2) => Some("2m"),
            Frequency::Minutes(5) => Some("5m"),
            Frequency::Minutes(15) => Some("15m"),
            Frequency::Minutes(30) => Some("30m"),
            Frequency::Minutes(60) => Some("60m"),
            Frequency::Minutes(90) => Some("90m"),
            Frequency::Minutes(_) => None,
        }
    }

    /// Chart API URL covering whole UTC days `start..=end`.
    fn chart_url(symbol: &str, range: Range<NaiveDate>, interval: &str) -> String {
        let start_ts = time::utc_midnight(range.start()).timestamp();
        let end_ts = (time::utc_midnight(range.end()) + ChronoDuration::days(1)).timestamp();
        format!(
            "{CHART_URL}/{symbol}?period1={start_ts}&period2={end_ts}&interval={interval}\
             &includeAdjustedClose=true"
        )
    }

    /// Parse the chart API response into bars.
    ///
    /// Daily bars are stamped at UTC midnight of the exchange-local session
    /// date; intraday bars keep Yahoo's UTC epoch. Rows with no OHLCV at all
    /// (holidays) are dropped. No timestamps means no data, not an error.
    fn parse_response(symbol: &str, freq: Frequency, resp: ChartResponse) -> Result<Vec<Bar>, DataError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                DataError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let offset = data.meta.gmtoffset;
        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none() {
                continue;
            }

            let timestamp = if freq.is_daily() {
                DateTime::from_timestamp(ts + offset, 0)
                    .map(|local| time::utc_midnight(local.date_naive()))
            } else {
                DateTime::<Utc>::from_timestamp(ts, 0)
            };
            let timestamp = timestamp
                .ok_or_else(|| DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?;

            let mut extra = BTreeMap::new();
            if let Some(adj) = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten()) {
                extra.insert("adj_close".to_string(), adj);
            }

            bars.push(Bar {
                symbol: symbol.to_string(),
                timestamp,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0.0),
                turnover: f64::NAN,
                extra,
            });
        }

        Ok(bars)
    }

    /// Backoff before `attempt`, with up to 25% random jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry.delay(attempt);
        let jitter = rand::thread_rng().gen_range(0.0..0.25);
        base.mul_f64(1.0 + jitter)
    }

    /// Execute a chart request with throttling and retry.
    fn fetch_with_retry(
        &self,
        symbol: &str,
        range: Range<NaiveDate>,
        freq: Frequency,
    ) -> Result<Vec<Bar>, DataError> {
        let interval = Self::interval(freq).ok_or_else(|| DataError::UnsupportedFrequency {
            provider: self.name().to_string(),
            freq,
        })?;
        let url = Self::chart_url(symbol, range, interval);
        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts.max(1) {
            if attempt > 0 {
                std::thread::sleep(self.backoff(attempt));
            }
            self.throttle.acquire();

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(DataError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(DataError::AuthenticationRequired(format!(
                            "Yahoo Finance refused the request (HTTP {status})"
                        )));
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(DataError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if !status.is_success() {
                        last_error = Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        DataError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    return Self::parse_response(symbol, freq, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn get_price(
        &self,
        symbol: &str,
        range: Range<NaiveDate>,
        freq: Frequency,
    ) -> Result<Vec<Bar>, DataError> {
        self.fetch_with_retry(symbol, range, freq)
    }

    /// Session dates of the calendar symbol's daily bars.
    fn get_trade_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, DataError> {
        let Some(range) = Range::new(start, end) else {
            return Ok(Vec::new());
        };
        let bars = self.fetch_with_retry(&self.calendar_symbol, range, Frequency::Daily)?;
        Ok(bars
            .iter()
            .map(Bar::date)
            .filter(|d| range.contains(*d))
            .collect())
    }
}
