use thiserror::Error;

use crate::api::ApiError;
use crate::models::TimesError;

/// Errors surfaced by a [`SabbathRepository`](crate::repository::SabbathRepository).
#[derive(Error, Debug)]
pub enum SabbathError {
    #[error("Failed to fetch Sabbath times: {0}")]
    Fetch(#[from] ApiError),

    #[error("Cache error: {0}")]
    Cache(#[from] anyhow::Error),

    #[error("No cached Sabbath times for week {0}")]
    NotCached(String),

    #[error("Invalid Sabbath times: {0}")]
    InvalidTimes(#[from] TimesError),
}
