//! Market data sync: providers, trading calendar cache, partitioned store
//! and the fetch orchestrator.

pub mod calendar;
pub mod chunk;
pub mod csv_source;
pub mod fetcher;
pub mod observer;
pub mod parquet;
pub mod provider;
pub mod securities;
pub mod store;
pub mod throttle;
pub mod yahoo;

pub use calendar::{TradingCalendar, TradingCalendarCache};
pub use chunk::{chunk_dates, ChunkConfig};
pub use csv_source::CsvProvider;
pub use fetcher::{FetchOutcome, FetchResult, MarketFetcher, SkipReason, SyncSummary};
pub use observer::{null_observer, NullObserver, ObserverSet, StdoutProgress, SyncObserver, TracingObserver};
pub use provider::{DataError, DataProvider};
pub use securities::SecuritiesCache;
pub use store::{PartitionInfo, PartitionedStore};
pub use throttle::Throttle;
pub use yahoo::YahooProvider;
