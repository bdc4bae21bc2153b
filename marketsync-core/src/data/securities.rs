//! Local cache of a provider's securities list.
//!
//! Stored at `{base_dir}/_securities/{provider}.parquet`. Listing endpoints are
//! slow and often quota-limited, so batch jobs read this file and only go back
//! to the provider when asked to refresh or when nothing cached matches.

use super::parquet;
use super::provider::{DataError, DataProvider};
use crate::domain::SecurityInfo;
use crate::time;
use polars::prelude::*;
use std::path::{Path, PathBuf};

pub struct SecuritiesCache {
    path: PathBuf,
}

impl SecuritiesCache {
    pub fn new(base_dir: impl AsRef<Path>, provider: &str) -> Self {
        Self {
            path: base_dir
                .as_ref()
                .join("_securities")
                .join(format!("{provider}.parquet")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached securities; a missing or unreadable file is an empty list.
    pub fn load(&self) -> Vec<SecurityInfo> {
        self.try_load().unwrap_or_default()
    }

    /// Cached securities, surfacing read errors. A missing file is an empty list.
    pub fn try_load(&self) -> Result<Vec<SecurityInfo>, DataError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let df = parquet::read(&self.path)?;

        let symbols = parquet::str_values(&df, "symbol")?;
        let names = parquet::str_values(&df, "name")?;
        let kinds = parquet::str_values(&df, "kind")?;
        let starts = parquet::millis_values(&df, "start_date")?;
        let ends = parquet::millis_values(&df, "end_date")?;
        let to_date = |ms: Option<i64>| ms.and_then(time::from_millis).map(|dt| dt.date_naive());

        let mut securities = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let Some(symbol) = symbols[i].clone() else {
                continue;
            };
            securities.push(SecurityInfo {
                symbol,
                name: names[i].clone(),
                kind: kinds[i].clone(),
                start_date: to_date(starts[i]),
                end_date: to_date(ends[i]),
            });
        }
        Ok(securities)
    }

    /// Securities matching `kinds`, from the cache when it has any, otherwise
    /// (or when `refresh` is set) freshly listed by `provider`. A non-empty
    /// fresh list replaces the cached one.
    pub fn resolve(
        &self,
        provider: &dyn DataProvider,
        kinds: &[String],
        refresh: bool,
    ) -> Result<Vec<SecurityInfo>, DataError> {
        if !refresh {
            let cached: Vec<SecurityInfo> = self
                .load()
                .into_iter()
                .filter(|s| s.matches_kinds(kinds))
                .collect();
            if !cached.is_empty() {
                return Ok(cached);
            }
        }

        let listed = provider.list_securities(Some(kinds))?;
        if !listed.is_empty() {
            self.save(&listed)?;
            tracing::info!(
                provider = provider.name(),
                count = listed.len(),
                path = %self.path.display(),
                "securities cached"
            );
        }
        Ok(listed.into_iter().filter(|s| s.matches_kinds(kinds)).collect())
    }

    /// Replace the cached list atomically.
    pub fn save(&self, securities: &[SecurityInfo]) -> Result<(), DataError> {
        let millis = |d: Option<chrono::NaiveDate>| d.map(|d| time::to_millis(time::utc_midnight(d)));
        let columns = vec![
            Column::new(
                "symbol".into(),
                securities.iter().map(|s| s.symbol.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                "name".into(),
                securities.iter().map(|s| s.name.as_deref()).collect::<Vec<_>>(),
            ),
            Column::new(
                "kind".into(),
                securities.iter().map(|s| s.kind.as_deref()).collect::<Vec<_>>(),
            ),
            parquet::optional_millis_column(
                "start_date",
                securities.iter().map(|s| millis(s.start_date)).collect(),
            )?,
            parquet::optional_millis_column(
                "end_date",
                securities.iter().map(|s| millis(s.end_date)).collect(),
            )?,
        ];
        let mut df = DataFrame::new(columns)
            .map_err(|e| DataError::ParquetError(format!("securities frame: {e}")))?;
        parquet::write_atomic(&mut df, &self.path)
    }
}
