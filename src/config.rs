use crate::error::{Result, SimError};
use crate::resolver::DEFAULT_MAX_DEPTH;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const CONFIG_FILE: &str = "stationsim.json";

/// Generation and lookup settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Fraction of a draw pool held back after each pick, in (0, 1].
    pub avoid_repeats_ratio: f64,
    /// Maximum track-list hops when dereferencing a track.
    pub max_reference_depth: usize,
    /// Daily playlists kept per station session.
    pub cache_days: usize,
    /// Offset from UTC of the station's calendar day, in minutes.
    pub utc_offset_minutes: i32,
    /// Base URL media is streamed from when not downloaded.
    pub remote_base_url: String,
    /// Root directory of downloaded station media.
    pub local_media_root: PathBuf,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            avoid_repeats_ratio: 0.5,
            max_reference_depth: DEFAULT_MAX_DEPTH,
            cache_days: 3,
            utc_offset_minutes: 0,
            remote_base_url: "https://media.example.invalid/stations".to_string(),
            local_media_root: default_media_root(),
        }
    }
}

fn default_media_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stationsim")
        .join("media")
}

impl SimulatorConfig {
    /// Default config location under the user's config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE)
    }

    /// Load config from JSON, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<SimulatorConfig>(&data) {
                    Ok(config) => match config.validate() {
                        Ok(()) => return config,
                        Err(e) => warn!("invalid config {}, using defaults: {}", path.display(), e),
                    },
                    Err(e) => warn!("corrupt config {}, using defaults: {}", path.display(), e),
                },
                Err(e) => warn!("could not read config {}: {}", path.display(), e),
            }
        }
        SimulatorConfig::default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.avoid_repeats_ratio > 0.0 && self.avoid_repeats_ratio <= 1.0) {
            return Err(format!(
                "avoid_repeats_ratio must be in (0, 1], got {}",
                self.avoid_repeats_ratio
            ));
        }
        if self.max_reference_depth == 0 {
            return Err("max_reference_depth must be at least 1".to_string());
        }
        if self.utc_offset().is_none() {
            return Err(format!("utc_offset_minutes out of range: {}", self.utc_offset_minutes));
        }
        Ok(())
    }

    /// The station's calendar offset, `None` when out of range.
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }

    /// Like `utc_offset`, but as an error for callers that need one.
    pub fn require_utc_offset(&self) -> Result<FixedOffset> {
        self.utc_offset().ok_or_else(|| {
            SimError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }
}
