//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the location used for sunset lookups, its timezone and
//! the API endpoints.
//!
//! Configuration is stored at `~/.config/sabbathcache/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono_tz::Tz;
use sabbathcache_core::api::DEFAULT_SUNSET_API_URL;
use sabbathcache_core::geocode::DEFAULT_GEOCODER_URL;
use sabbathcache_core::Coordinates;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "sabbathcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Cache database file name
const CACHE_DB_FILE: &str = "sabbath.db";

/// Environment overrides
const ENV_LATITUDE: &str = "SABBATHCACHE_LATITUDE";
const ENV_LONGITUDE: &str = "SABBATHCACHE_LONGITUDE";
const ENV_TIMEZONE: &str = "SABBATHCACHE_TIMEZONE";

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_sunset_api_url() -> String {
    DEFAULT_SUNSET_API_URL.to_string()
}

fn default_geocoder_api_url() -> String {
    DEFAULT_GEOCODER_URL.to_string()
}

fn default_routine_check_hours() -> u64 {
    24
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_sunset_api_url")]
    pub sunset_api_url: String,
    #[serde(default = "default_geocoder_api_url")]
    pub geocoder_api_url: String,
    #[serde(default = "default_routine_check_hours")]
    pub routine_check_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            timezone: default_timezone(),
            sunset_api_url: default_sunset_api_url(),
            geocoder_api_url: default_geocoder_api_url(),
            routine_check_hours: default_routine_check_hours(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cache_db_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(CACHE_DB_FILE))
    }

    /// Override coordinates and timezone from the environment.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(lat) = lookup(ENV_LATITUDE) {
            self.latitude = Some(lat.trim().parse().map_err(|_| anyhow!("Invalid {}: {}", ENV_LATITUDE, lat))?);
        }
        if let Some(lon) = lookup(ENV_LONGITUDE) {
            self.longitude = Some(lon.trim().parse().map_err(|_| anyhow!("Invalid {}: {}", ENV_LONGITUDE, lon))?);
        }
        if let Some(tz) = lookup(ENV_TIMEZONE) {
            self.timezone = tz.trim().to_string();
        }
        Ok(())
    }

    pub fn coordinates(&self) -> Result<Option<Coordinates>> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Ok(Some(Coordinates::new(lat, lon)?)),
            _ => Ok(None),
        }
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid timezone {}: {}", self.timezone, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.routine_check_hours, 24);
        assert!(config.coordinates().unwrap().is_none());
        assert_eq!(config.tz().unwrap(), Tz::UTC);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sabbathcache").join(CONFIG_FILE);

        let config = Config {
            latitude: Some(34.0522),
            longitude: Some(-117.2437),
            timezone: "America/Los_Angeles".to_string(),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.tz().unwrap(), chrono_tz::America::Los_Angeles);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"latitude": 1.5, "longitude": 2.5}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.sunset_api_url, DEFAULT_SUNSET_API_URL);
        assert_eq!(loaded.coordinates().unwrap().unwrap().latitude, 1.5);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_LATITUDE, "40.7128"),
            (ENV_LONGITUDE, " -74.006 "),
            (ENV_TIMEZONE, "America/New_York"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.latitude, Some(40.7128));
        assert_eq!(config.longitude, Some(-74.006));
        assert_eq!(config.tz().unwrap(), chrono_tz::America::New_York);

        let mut bad = Config::default();
        assert!(bad
            .apply_env_overrides(|key| (key == ENV_LATITUDE).then(|| "north".to_string()))
            .is_err());
    }

    #[test]
    fn test_invalid_values() {
        let config = Config {
            latitude: Some(123.0),
            longitude: Some(0.0),
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Config::default()
        };
        assert!(config.coordinates().is_err());
        assert!(config.tz().is_err());
    }
}
