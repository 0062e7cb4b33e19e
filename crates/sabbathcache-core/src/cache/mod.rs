//! Local caching module for offline Sabbath times.
//!
//! This module provides the `SabbathCache`, a SQLite table `sabbath_times`
//! keyed by week-key (the Friday's date). Rows are written whenever a fresh
//! fetch succeeds and are never expired: a new week simply misses the cache.

pub mod store;

pub use store::SabbathCache;
