//! Sabbath start and end times, cached for offline use.
//!
//! This crate resolves the Friday-sunset-to-Saturday-sunset window for a
//! location and keeps it in a local SQLite cache:
//!
//! - [`calendar`]: which Friday/Saturday bound the current or upcoming Sabbath
//! - [`api`]: sunset lookups against a public sunrise/sunset API
//! - [`cache`]: the `sabbath_times` table, keyed by the Friday's date
//! - [`repository`]: cache-first resolution into displayable [`SabbathInfo`]
//! - [`scheduler`] and [`worker`]: background jobs that announce the Sabbath start

pub mod api;
pub mod cache;
pub mod calendar;
pub mod error;
pub mod geocode;
pub mod models;
pub mod notify;
pub mod preferences;
pub mod repository;
pub mod scheduler;
pub mod worker;

pub use error::SabbathError;
pub use models::{Coordinates, SabbathInfo, SabbathTimes, SabbathTimesEntity, SabbathWeek};
pub use repository::{CachedSabbathRepository, RepositoryContext, SabbathRepository, SyncingSabbathRepository};
