//! Lightweight key-value preferences persisted as JSON.
//!
//! Holds the last served Sabbath end (used to roll the week forward) with
//! the coordinates it was computed for, and whether Sabbath notifications
//! are wanted. The cached rows belong to those coordinates too.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::models::Coordinates;

/// Preferences file name in cache directory
pub const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceData {
    #[serde(default)]
    pub last_sabbath_end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub last_coordinates: Option<Coordinates>,
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
}

fn default_notifications_enabled() -> bool {
    true
}

impl Default for PreferenceData {
    fn default() -> Self {
        Self {
            last_sabbath_end: None,
            last_coordinates: None,
            notifications_enabled: default_notifications_enabled(),
        }
    }
}

/// Preference store. Every setter writes through to disk unless the store is
/// in-memory.
#[derive(Debug)]
pub struct Preferences {
    path: Option<PathBuf>,
    data: Mutex<PreferenceData>,
}

impl Preferences {
    /// Load preferences from `cache_dir`, falling back to defaults if the file is absent.
    pub fn load(cache_dir: PathBuf) -> Result<Self> {
        let path = cache_dir.join(PREFERENCES_FILE);
        let data = if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read preferences file")?;
            serde_json::from_str(&contents).context("Failed to parse preferences file")?
        } else {
            PreferenceData::default()
        };
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(PreferenceData::default()),
        }
    }

    /// Snapshot of the current values
    pub fn snapshot(&self) -> PreferenceData {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last_sabbath_end(&self) -> Option<DateTime<FixedOffset>> {
        self.snapshot().last_sabbath_end
    }

    pub fn set_last_sabbath_end(&self, end: DateTime<FixedOffset>) -> Result<()> {
        self.update(|data| data.last_sabbath_end = Some(end))
    }

    /// Record a served Sabbath end together with the place it belongs to.
    pub fn record_sabbath(&self, end: DateTime<FixedOffset>, coords: Coordinates) -> Result<()> {
        self.update(|data| {
            data.last_sabbath_end = Some(end);
            data.last_coordinates = Some(coords);
        })
    }

    /// [`record_sabbath`](Self::record_sabbath) on the blocking pool.
    pub async fn remember_sabbath(
        self: &Arc<Self>,
        end: DateTime<FixedOffset>,
        coords: Coordinates,
    ) -> Result<()> {
        let prefs = Arc::clone(self);
        tokio::task::spawn_blocking(move || prefs.record_sabbath(end, coords))
            .await
            .context("Preferences task failed")?
    }

    /// Drop the remembered end so the next query does not roll forward.
    pub fn forget_sabbath_end(&self) -> Result<()> {
        self.update(|data| data.last_sabbath_end = None)
    }

    pub fn last_coordinates(&self) -> Option<Coordinates> {
        self.snapshot().last_coordinates
    }

    pub fn set_last_coordinates(&self, coords: Coordinates) -> Result<()> {
        self.update(|data| data.last_coordinates = Some(coords))
    }

    pub fn notifications_enabled(&self) -> bool {
        self.snapshot().notifications_enabled
    }

    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|data| data.notifications_enabled = enabled)
    }

    /// Reset to defaults and remove the file
    pub fn clear(&self) -> Result<()> {
        {
            let mut guard = self
                .data
                .lock()
                .map_err(|_| anyhow!("Preferences lock poisoned"))?;
            *guard = PreferenceData::default();
        }
        if let Some(ref path) = self.path {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut PreferenceData)) -> Result<()> {
        let snapshot = {
            let mut guard = self
                .data
                .lock()
                .map_err(|_| anyhow!("Preferences lock poisoned"))?;
            apply(&mut guard);
            guard.clone()
        };
        self.save(&snapshot)
    }

    fn save(&self, data: &PreferenceData) -> Result<()> {
        if let Some(ref path) = self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents).context("Failed to write preferences file")?;
        }
        Ok(())
    }
}
