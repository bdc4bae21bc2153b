//! Provider configuration loaded from TOML.
//!
//! ```toml
//! default_provider = "yahoo"
//!
//! [providers.yahoo]
//! base_dir = "data"
//! timezone = "America/New_York"
//! calendar_symbol = "SPY"
//!
//! [providers.yahoo.throttle]
//! max_per_minute = 60
//! burst = 5
//!
//! [providers.csv]
//! source_dir = "csv"
//! ```

use crate::data::csv_source::CsvProvider;
use crate::data::provider::{DataError, DataProvider};
use crate::data::throttle::Throttle;
use crate::data::yahoo::YahooProvider;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse config: {0}")]
    Parse(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("provider '{provider}' is missing required field '{field}'")]
    MissingField { provider: String, field: String },

    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),

    #[error("failed to start provider: {0}")]
    Provider(#[from] DataError),
}

/// Vendor implementation behind a provider table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Yahoo,
    Csv,
}

impl ProviderKind {
    fn parse(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "yahoo" | "yahoo_finance" => Some(Self::Yahoo),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Request rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub max_per_minute: u32,
    pub burst: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 60,
            burst: 5,
        }
    }
}

impl ThrottleConfig {
    pub fn build(&self) -> Throttle {
        Throttle::new(self.max_per_minute, self.burst)
    }
}

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub backoff_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: 1.0,
        }
    }
}

impl RetryConfig {
    /// Base delay before attempt `attempt` (0-based; attempt 0 has none).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.backoff_seconds <= 0.0 {
            return Duration::ZERO;
        }
        let factor = 2f64.powi(attempt.saturating_sub(1).min(16) as i32);
        Duration::from_secs_f64(self.backoff_seconds * factor)
    }
}

/// One `[providers.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Vendor implementation; defaults to the table name.
    pub kind: Option<String>,
    pub base_dir: PathBuf,
    /// IANA zone the vendor's naive timestamps are expressed in.
    pub timezone: String,
    /// Symbol whose daily bars define the trading calendar (Yahoo).
    pub calendar_symbol: Option<String>,
    /// Directory of `{SYMBOL}.csv` files (CSV).
    pub source_dir: Option<PathBuf>,
    pub throttle: ThrottleConfig,
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: None,
            base_dir: PathBuf::from("data"),
            timezone: "UTC".into(),
            calendar_symbol: None,
            source_dir: None,
            throttle: ThrottleConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ProviderConfig {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}

/// Root of the data configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub default_provider: String,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for DataConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "yahoo".to_string(),
            ProviderConfig {
                timezone: "America/New_York".into(),
                calendar_symbol: Some("SPY".into()),
                ..ProviderConfig::default()
            },
        );
        Self {
            default_provider: "yahoo".into(),
            providers,
        }
    }
}

impl DataConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The named provider's table, or the default provider's when `name` is `None`.
    pub fn provider(&self, name: Option<&str>) -> Result<(&str, &ProviderConfig), ConfigError> {
        let name = name.unwrap_or(&self.default_provider);
        self.providers
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))
    }

    /// Validate a provider table and build its implementation.
    pub fn open_provider(
        &self,
        name: Option<&str>,
    ) -> Result<(Arc<dyn DataProvider>, &ProviderConfig), ConfigError> {
        let (name, config) = self.provider(name)?;
        let kind_name = config.kind.as_deref().unwrap_or(name);
        let kind = ProviderKind::parse(kind_name)
            .ok_or_else(|| ConfigError::UnknownProvider(kind_name.to_string()))?;
        let tz = config.tz()?;

        let provider: Arc<dyn DataProvider> = match kind {
            ProviderKind::Yahoo => {
                let calendar_symbol = config.calendar_symbol.as_deref().unwrap_or("SPY");
                Arc::new(YahooProvider::new(
                    config.throttle.build(),
                    config.retry,
                    calendar_symbol,
                )?)
            }
            ProviderKind::Csv => {
                let source_dir =
                    config
                        .source_dir
                        .as_ref()
                        .ok_or_else(|| ConfigError::MissingField {
                            provider: name.to_string(),
                            field: "source_dir".into(),
                        })?;
                Arc::new(CsvProvider::new(name, source_dir, tz))
            }
        };
        Ok((provider, config))
    }
}
