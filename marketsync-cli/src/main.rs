//! marketsync CLI: incremental market data download and store inspection.
//!
//! Commands:
//! - `fetch`: sync a symbol list (or the whole listed market) for a date range
//! - `daily`: sync the previous UTC day for every cached security
//! - `status`: report stored partitions, row counts, ranges and daily gaps

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use marketsync_core::config::DataConfig;
use marketsync_core::data::{
    ChunkConfig, DataProvider, FetchResult, MarketFetcher, ObserverSet, PartitionedStore,
    SecuritiesCache, StdoutProgress, SyncObserver, SyncSummary, TracingObserver,
    TradingCalendarCache,
};
use marketsync_core::domain::Frequency;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marketsync", about = "marketsync: incremental market data downloader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command.
#[derive(Args)]
struct Common {
    /// Path to the TOML data config.
    #[arg(long, default_value = "config/data.toml")]
    config: PathBuf,

    /// Provider table to use. Defaults to the config's `default_provider`.
    #[arg(long)]
    provider: Option<String>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// How to pick symbols when no explicit list is given.
#[derive(Args)]
struct Universe {
    /// Security types to include with --all (comma separated, e.g. stock,etf).
    #[arg(long, default_value = "stock", value_delimiter = ',')]
    types: Vec<String>,

    /// Only take the first N securities (for trial runs).
    #[arg(long)]
    limit: Option<usize>,

    /// Re-list securities from the provider instead of the local cache.
    #[arg(long, default_value_t = false)]
    refresh_securities: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync bars for a date range into the partitioned store.
    Fetch {
        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        end: Option<String>,

        /// Bar frequency: 1d, 1m, 5m, 60m, ...
        #[arg(long, default_value = "1d")]
        freq: Frequency,

        /// Symbols to sync (comma separated). Takes precedence over --all.
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Sync every listed security.
        #[arg(long, default_value_t = false)]
        all: bool,

        #[command(flatten)]
        universe: Universe,

        /// Longest daily request, in days.
        #[arg(long, default_value_t = 366)]
        chunk_days: usize,

        /// Longest intraday request, in minutes (rounded down to whole days).
        #[arg(long, default_value_t = 3 * 24 * 60)]
        chunk_minutes: u32,

        /// Request every trading day in the range, even ones already stored.
        #[arg(long, default_value_t = false)]
        full_refresh: bool,

        #[command(flatten)]
        common: Common,
    },
    /// Sync one day (default: yesterday, UTC) for every cached security.
    Daily {
        /// Day to sync (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        #[command(flatten)]
        universe: Universe,

        #[command(flatten)]
        common: Common,
    },
    /// Report what is stored.
    Status {
        /// Only this symbol. Defaults to every stored symbol.
        #[arg(long)]
        symbol: Option<String>,

        /// Bar frequency to inspect.
        #[arg(long, default_value = "1d")]
        freq: Frequency,

        #[command(flatten)]
        common: Common,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            start,
            end,
            freq,
            symbols,
            all,
            universe,
            chunk_days,
            chunk_minutes,
            full_refresh,
            common,
        } => {
            init_tracing(&common.log_level);
            let start = parse_date(&start)?;
            let end = end
                .as_deref()
                .map(parse_date)
                .transpose()?
                .unwrap_or_else(|| Utc::now().date_naive());
            if start > end {
                bail!("--start {start} is after --end {end}");
            }
            let chunking = ChunkConfig::new(chunk_days, chunk_minutes);
            run_fetch(&common, start, end, freq, symbols, all, &universe, chunking, !full_refresh)
        }
        Commands::Daily {
            date,
            universe,
            common,
        } => {
            init_tracing(&common.log_level);
            let day = date
                .as_deref()
                .map(parse_date)
                .transpose()?
                .unwrap_or_else(|| Utc::now().date_naive() - Duration::days(1));
            run_daily(&common, day, &universe)
        }
        Commands::Status {
            symbol,
            freq,
            common,
        } => {
            init_tracing(&common.log_level);
            run_status(&common, symbol, freq)
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

/// Load the config file; a missing file falls back to built-in defaults.
fn load_config(path: &Path) -> Result<DataConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(DataConfig::default());
    }
    Ok(DataConfig::from_file(path)?)
}

fn build_fetcher(common: &Common, chunking: ChunkConfig) -> Result<(MarketFetcher, PathBuf)> {
    let config = load_config(&common.config)?;
    let (provider, provider_config) = config.open_provider(common.provider.as_deref())?;
    let base_dir = provider_config.base_dir.clone();
    tracing::info!(provider = provider.name(), base_dir = %base_dir.display(), "opened provider");

    let observers: Vec<Arc<dyn SyncObserver>> =
        vec![Arc::new(TracingObserver), Arc::new(StdoutProgress)];
    let observer = Arc::new(ObserverSet(observers));
    let fetcher = MarketFetcher::new(provider, PartitionedStore::new(&base_dir))
        .with_chunking(chunking)
        .with_observer(observer);
    Ok((fetcher, base_dir))
}

/// Securities of the universe's types, from the local cache or the provider.
fn listed_symbols(fetcher: &MarketFetcher, base_dir: &Path, universe: &Universe) -> Result<Vec<String>> {
    let cache = SecuritiesCache::new(base_dir, fetcher.provider().name());
    let securities = cache
        .resolve(fetcher.provider(), &universe.types, universe.refresh_securities)
        .context("listing securities")?;
    if securities.is_empty() {
        bail!("provider returned no securities for types {:?}", universe.types);
    }

    let mut symbols: Vec<String> = securities.into_iter().map(|s| s.symbol).collect();
    if let Some(limit) = universe.limit {
        symbols.truncate(limit);
    }
    Ok(symbols)
}

fn finish(results: &[FetchResult]) -> Result<()> {
    let summary = SyncSummary::from_results(results);
    if !summary.all_succeeded() {
        for (sym, err) in &summary.failures {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_fetch(
    common: &Common,
    start: NaiveDate,
    end: NaiveDate,
    freq: Frequency,
    symbols: Vec<String>,
    all: bool,
    universe: &Universe,
    chunking: ChunkConfig,
    use_missing_ranges: bool,
) -> Result<()> {
    let (mut fetcher, base_dir) = build_fetcher(common, chunking)?;

    let symbols: Vec<String> = if !symbols.is_empty() {
        symbols
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    } else if all {
        listed_symbols(&fetcher, &base_dir, universe)?
    } else {
        bail!("one of --symbols or --all is required");
    };

    println!(
        "Total symbols: {}; freq={freq}; start={start} end={end}",
        symbols.len()
    );
    let results = fetcher.fetch_symbols(&symbols, start, end, freq, use_missing_ranges);
    finish(&results)
}

fn run_daily(common: &Common, day: NaiveDate, universe: &Universe) -> Result<()> {
    let (mut fetcher, base_dir) = build_fetcher(common, ChunkConfig::default())?;
    let symbols = listed_symbols(&fetcher, &base_dir, universe)?;

    tracing::info!(%day, symbols = symbols.len(), "daily sync");
    let results = fetcher.fetch_symbols(&symbols, day, day, Frequency::Daily, true);
    finish(&results)
}

fn run_status(common: &Common, symbol: Option<String>, freq: Frequency) -> Result<()> {
    let config = load_config(&common.config)?;
    let (provider_name, provider_config) = config.provider(common.provider.as_deref())?;
    let store = PartitionedStore::new(&provider_config.base_dir);

    let symbols = match symbol {
        Some(s) => vec![s],
        None => store.symbols(freq)?,
    };
    if symbols.is_empty() {
        println!("Store is empty: {} (freq={freq})", store.base_dir().display());
        return Ok(());
    }

    let mut calendar = TradingCalendarCache::new(store.base_dir(), provider_name);
    let trading_days = calendar.cached().clone();

    println!("Store: {}", store.base_dir().display());
    println!("Frequency: {freq}");
    println!();
    println!(
        "{:<14} {:>5} {:>10} {:<43} {:>10} {:>6}",
        "Symbol", "Parts", "Rows", "Range", "Size", "Gaps"
    );
    println!("{}", "-".repeat(93));

    for symbol in &symbols {
        let partitions = store.partitions(symbol, freq)?;
        if partitions.is_empty() {
            println!("{symbol:<14} (no data)");
            continue;
        }
        let rows: usize = partitions.iter().map(|p| p.rows).sum();
        let bytes: u64 = partitions.iter().map(|p| p.bytes).sum();
        let first = partitions.iter().filter_map(|p| p.first).min();
        let last = partitions.iter().filter_map(|p| p.last).max();
        let range = match (first, last) {
            (Some(a), Some(b)) => format!("{} -> {}", a.format("%Y-%m-%d %H:%M"), b.format("%Y-%m-%d %H:%M")),
            _ => "-".into(),
        };

        let gaps = match (freq.is_daily(), first, last) {
            (true, Some(first), Some(last)) => {
                let bars = store.load(symbol, freq)?;
                let missing = PartitionedStore::missing_ranges(&bars, first, last, freq);
                if trading_days.is_empty() {
                    format!("{}", missing.len())
                } else {
                    let days = missing
                        .iter()
                        .flat_map(|r| {
                            trading_days.between(r.start().date_naive(), r.end().date_naive()).into_days()
                        })
                        .count();
                    format!("{days}d")
                }
            }
            _ => "-".into(),
        };

        println!(
            "{:<14} {:>5} {:>10} {:<43} {:>10} {:>6}",
            symbol,
            partitions.len(),
            rows,
            range,
            format_size(bytes),
            gaps
        );
    }

    if freq.is_daily() {
        println!();
        if trading_days.is_empty() {
            println!("Gaps: missing calendar-day ranges between first and last stored bar.");
        } else {
            println!("Gaps: missing trading days between first and last stored bar.");
        }
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
