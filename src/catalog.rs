//! Station catalog model.
//!
//! The catalog is an immutable, in-memory view of a station document: its
//! track lists, tracks and playlist rules. Field names follow the camelCase
//! JSON documents produced by the catalog importer.

use crate::error::{Result, SimError};
use crate::time::MediaTime;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub stations: Vec<Station>,
    #[serde(default)]
    pub track_lists: Vec<TrackList>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Free-form metadata (genre, host, artwork...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,
    /// Track lists this station's media comes from (the download set).
    /// Must exist in the catalog; rule lookups are not limited to them.
    #[serde(default)]
    pub track_lists: Vec<String>,
    pub playlist: PlaylistRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackList {
    pub id: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl TrackList {
    /// Find a track by its local id.
    pub fn find(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }
}

/// A catalog track: either terminal (path + duration) or a reference into
/// another track list that shares its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Offset of the playable part inside the file.
    #[serde(default)]
    pub start: MediaTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<MediaTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_list: Option<String>,
    /// Ids of tracks usable as intro variants for this track.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intro: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<Marker>,
}

impl Track {
    /// A terminal track with a concrete file.
    pub fn terminal(id: &str, path: &str, duration: MediaTime) -> Self {
        Track {
            id: id.to_string(),
            path: Some(path.to_string()),
            start: MediaTime::ZERO,
            duration: Some(duration),
            track_list: None,
            intro: Vec::new(),
            markers: Vec::new(),
        }
    }

    /// A track pointing at the same id in another track list.
    pub fn reference(id: &str, track_list: &str) -> Self {
        Track {
            id: id.to_string(),
            path: None,
            start: MediaTime::ZERO,
            duration: None,
            track_list: Some(track_list.to_string()),
            intro: Vec::new(),
            markers: Vec::new(),
        }
    }
}

/// A now-playing changepoint inside a track, relative to the track start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub offset: MediaTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRules {
    pub first_fragment: Vec<Transition>,
    pub fragments: Vec<Fragment>,
    #[serde(default)]
    pub options: PlaybackOptions,
    #[serde(default)]
    pub positions: Vec<Position>,
}

/// An edge of the fragment graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub fragment: String,
    /// Relative weight; `None` counts as 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Playback option this edge is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
}

impl Transition {
    pub fn weight(&self) -> f64 {
        self.probability.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackOptions {
    #[serde(default)]
    pub available: Vec<String>,
    /// When set, the alternating mode switches option at this period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_interval: Option<MediaTime>,
}

/// Named anchor for voice-over placement, as a fraction of the host's free time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub relative_offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub id: String,
    pub src: SourceSpec,
    #[serde(default)]
    pub voice_over: Vec<VoiceOver>,
    #[serde(default)]
    pub next: Vec<Transition>,
}

/// Raw fragment source as authored. Exactly one field must be populated;
/// `rules` compiles it into a tagged `FragmentSource`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_lists: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro_track_lists: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceOver {
    pub id: String,
    pub src: SourceSpec,
    #[serde(default)]
    pub condition: Condition,
    /// Acceptable positions, in order of preference.
    pub positions: Vec<String>,
}

/// All specified predicates must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_fragment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_interval: Option<TimeInterval>,
}

/// Time-of-day window `[from, to)`; wraps past midnight when `to <= from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl TimeInterval {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.from < self.to {
            t >= self.from && t < self.to
        } else {
            t >= self.from || t < self.to
        }
    }
}

impl Catalog {
    /// Parse and validate a catalog document.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let catalog = Self::from_json(&data)?;
        info!(
            path = %path.display(),
            stations = catalog.stations.len(),
            track_lists = catalog.track_lists.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Reject duplicate station and track list ids, and stations declaring
    /// track lists the catalog lacks.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for station in &self.stations {
            if !seen.insert(station.id.as_str()) {
                return Err(SimError::DuplicateId(station.id.clone()));
            }
        }
        let mut seen = HashSet::new();
        for list in &self.track_lists {
            if !seen.insert(list.id.as_str()) {
                return Err(SimError::DuplicateId(list.id.clone()));
            }
        }
        for station in &self.stations {
            if let Some(missing) = station.track_lists.iter().find(|id| !seen.contains(id.as_str())) {
                return Err(SimError::TrackListNotFound(missing.clone()));
            }
        }
        Ok(())
    }

    pub fn station(&self, id: &str) -> Result<&Station> {
        self.stations
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| SimError::StationNotFound(id.to_string()))
    }

    /// Index of track lists by id.
    pub fn track_list_index(&self) -> HashMap<&str, &TrackList> {
        self.track_lists
            .iter()
            .map(|list| (list.id.as_str(), list))
            .collect()
    }
}
