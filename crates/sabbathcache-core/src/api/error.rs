use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Sunset lookup failed with status {0}")]
    LookupFailed(String),

    #[error("Sabbath times incomplete: {}", describe_failures(.0))]
    Incomplete(Vec<DayFailure>),
}

/// A failed sunset lookup for one of the two Sabbath boundary dates.
#[derive(Debug)]
pub struct DayFailure {
    pub date: NaiveDate,
    pub error: ApiError,
}

fn describe_failures(failures: &[DayFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}): {}", f.date.format("%A"), f.date, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 | 403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether this failure is worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited | ApiError::ServerError(_) | ApiError::NetworkError(_) => true,
            ApiError::Incomplete(failures) => failures.iter().any(|f| f.error.is_transient()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, ""),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "bad lat"),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(2000);
        match ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            ApiError::ServerError(msg) => {
                assert!(msg.len() < 600);
                assert!(msg.contains("2000 total bytes"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_names_failed_days() {
        let err = ApiError::Incomplete(vec![DayFailure {
            date: NaiveDate::from_ymd_opt(2025, 9, 27).unwrap(),
            error: ApiError::LookupFailed("INVALID_DATE".to_string()),
        }]);
        let msg = err.to_string();
        assert!(msg.contains("Saturday (2025-09-27)"));
        assert!(msg.contains("INVALID_DATE"));
        assert!(!err.is_transient());
    }
}
