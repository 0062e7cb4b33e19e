//! Location types: coordinates for sunset lookups and reverse geocoded places.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Label shown when the coordinates cannot be resolved to a place.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Coordinates closer than this (in degrees) are the same place.
const SAME_PLACE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            bail!("Latitude out of range: {}", latitude);
        }
        if !(-180.0..=180.0).contains(&longitude) {
            bail!("Longitude out of range: {}", longitude);
        }
        Ok(Self { latitude, longitude })
    }

    /// Whether `other` names the same point, allowing for float noise from
    /// a JSON round trip.
    pub fn same_place(&self, other: &Coordinates) -> bool {
        (self.latitude - other.latitude).abs() < SAME_PLACE_TOLERANCE
            && (self.longitude - other.longitude).abs() < SAME_PLACE_TOLERANCE
    }
}

/// A reverse geocoded place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub city: Option<String>,
    pub region: Option<String>,
}

impl Place {
    /// Format as "city, region", or whichever part is present.
    pub fn label(&self) -> Option<String> {
        let city = self.city.as_deref().filter(|s| !s.is_empty());
        let region = self.region.as_deref().filter(|s| !s.is_empty());
        match (city, region) {
            (Some(city), Some(region)) => Some(format!("{}, {}", city, region)),
            (Some(city), None) => Some(city.to_string()),
            (None, Some(region)) => Some(region.to_string()),
            (None, None) => None,
        }
    }
}
