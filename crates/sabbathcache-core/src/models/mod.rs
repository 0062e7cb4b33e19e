//! Data models for Sabbath time resolution.
//!
//! This module contains the data structures passed between the calculator,
//! the sunset API client, the cache and the repository:
//!
//! - `Coordinates`: latitude/longitude pair for sunset lookups
//! - `SabbathWeek`: the Friday/Saturday calendar dates of one Sabbath
//! - `SabbathTimes`: the two sunset timestamps fetched from the API
//! - `SabbathTimesEntity`: the cached row form of `SabbathTimes`
//! - `SabbathInfo`: the display value with location label and "is Sabbath now" flag

pub mod location;
pub mod sabbath;

pub use location::{Coordinates, Place, UNKNOWN_LOCATION};
pub use sabbath::{SabbathInfo, SabbathTimes, SabbathTimesEntity, SabbathWeek, TimesError};
