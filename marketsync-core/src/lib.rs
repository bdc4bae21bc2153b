//! marketsync core: incremental market-data downloader.
//!
//! This crate contains:
//! - Domain types (bars, frequencies, inclusive ranges, securities)
//! - A persistent, grow-only trading calendar cache
//! - A Hive-partitioned Parquet bar store with first-wins upsert and gap detection
//! - The fetch orchestrator that turns missing trading days into bounded
//!   provider requests
//! - Provider adapters (Yahoo Finance, CSV drop folders) and TOML config

pub mod config;
pub mod data;
pub mod domain;
pub mod time;
