//! HTTP client for the sunrise/sunset API.
//!
//! `GET {base}/json?lat=..&lng=..&date=YYYY-MM-DD&formatted=0&tzid=<IANA>`
//! answers with `{"results": {"sunset": "<ISO-8601>", ...}, "status": "OK"}`.
//! On failure `status` carries an error code and `results` is empty.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::Coordinates;

use super::source::SunsetSource;
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Public sunrise/sunset API.
pub const DEFAULT_SUNSET_API_URL: &str = "https://api.sunrise-sunset.org";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Status value of a successful lookup.
const STATUS_OK: &str = "OK";

#[derive(Debug, Deserialize)]
struct SunsetEnvelope {
    status: String,
    #[serde(default)]
    results: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SunsetResults {
    sunset: String,
}

/// Client for the sunrise/sunset API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client against the public API
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_SUNSET_API_URL)
    }

    /// Create a client against another deployment of the same API
    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET with rate-limit backoff, returning the response body.
    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.client.get(url).query(query).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.text().await?);
            }

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }
}

/// Extract the sunset timestamp from a response body.
fn parse_sunset(body: &str) -> Result<DateTime<FixedOffset>, ApiError> {
    let envelope: SunsetEnvelope = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("Malformed sunset response: {}", e)))?;

    if envelope.status != STATUS_OK {
        return Err(ApiError::LookupFailed(envelope.status));
    }

    let results: SunsetResults = serde_json::from_value(envelope.results)
        .map_err(|e| ApiError::InvalidResponse(format!("Missing sunset in response: {}", e)))?;

    DateTime::parse_from_rfc3339(&results.sunset).map_err(|e| {
        ApiError::InvalidResponse(format!("Invalid sunset timestamp {}: {}", results.sunset, e))
    })
}

#[async_trait]
impl SunsetSource for ApiClient {
    async fn fetch_sunset(
        &self,
        coords: Coordinates,
        date: NaiveDate,
        tz: Tz,
    ) -> Result<DateTime<FixedOffset>, ApiError> {
        let url = format!("{}/json", self.base_url);
        let query = [
            ("lat", coords.latitude.to_string()),
            ("lng", coords.longitude.to_string()),
            ("date", date.format("%Y-%m-%d").to_string()),
            ("formatted", "0".to_string()),
            ("tzid", tz.name().to_string()),
        ];

        debug!(%date, tz = tz.name(), "Requesting sunset");
        let body = self.get_text(&url, &query).await?;
        parse_sunset(&body)
    }
}
