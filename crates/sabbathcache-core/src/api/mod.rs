//! Sunset API client module.
//!
//! This module provides the `SunsetSource` trait and its HTTP implementation
//! `ApiClient`, which asks a public sunrise/sunset service for the Friday
//! and Saturday sunsets bounding a Sabbath.

pub mod client;
pub mod error;
pub mod source;

pub use client::{ApiClient, DEFAULT_SUNSET_API_URL};
pub use error::{ApiError, DayFailure};
pub use source::SunsetSource;
