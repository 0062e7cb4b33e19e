//! Reverse geocoding of coordinates to a "city, region" label.
//!
//! Lookups are best effort: [`resolve_label`] never fails, it falls back to
//! [`UNKNOWN_LOCATION`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::models::{Coordinates, Place, UNKNOWN_LOCATION};

/// Public Nominatim instance.
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Nominatim rejects requests without an identifying user agent.
const USER_AGENT: &str = concat!("sabbathcache/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Place at `coords`, or `None` if nothing is known there.
    async fn reverse(&self, coords: Coordinates) -> Result<Option<Place>, ApiError>;
}

/// Geocoder that never resolves anything; used when working offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGeocoder;

#[async_trait]
impl Geocoder for OfflineGeocoder {
    async fn reverse(&self, _coords: Coordinates) -> Result<Option<Place>, ApiError> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<ReverseAddress>,
}

#[derive(Debug, Deserialize)]
struct ReverseAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    state: Option<String>,
}

impl ReverseAddress {
    fn into_place(self) -> Place {
        Place {
            city: self.city.or(self.town).or(self.village).or(self.county),
            region: self.state,
        }
    }
}

/// Reverse geocoder backed by the Nominatim HTTP API.
#[derive(Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn parse_reverse(body: &str) -> Result<Option<Place>, ApiError> {
    let parsed: ReverseResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("Malformed geocoder response: {}", e)))?;
    Ok(parsed.address.map(ReverseAddress::into_place))
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, coords: Coordinates) -> Result<Option<Place>, ApiError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }
        parse_reverse(&body)
    }
}

/// Display label for `coords`, degrading to "Unknown Location" on any failure.
pub async fn resolve_label(geocoder: &dyn Geocoder, coords: Coordinates) -> String {
    match geocoder.reverse(coords).await {
        Ok(Some(place)) => place.label().unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        Ok(None) => {
            debug!(lat = coords.latitude, lon = coords.longitude, "No place found for coordinates");
            UNKNOWN_LOCATION.to_string()
        }
        Err(e) => {
            warn!(error = %e, "Reverse geocoding failed");
            UNKNOWN_LOCATION.to_string()
        }
    }
}
