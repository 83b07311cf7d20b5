//! Where a segment's audio comes from.
//!
//! The download manager decides whether a station's media is on disk; this
//! module only turns (station, path, downloaded?) into a file path or URL.

use crate::config::SimulatorConfig;
use crate::playlist::{AudioSegment, PlaylistItem};
use serde::Serialize;
use std::path::PathBuf;

/// Answers "is this station's media downloaded?".
pub trait MediaAvailability {
    fn is_available_locally(&self, station_id: &str) -> bool;
}

impl<F: Fn(&str) -> bool> MediaAvailability for F {
    fn is_available_locally(&self, station_id: &str) -> bool {
        self(station_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "location")]
pub enum MediaSource {
    Local(PathBuf),
    Remote(String),
}

/// A segment together with the location its audio is read from.
#[derive(Debug, Clone, Serialize)]
pub struct LocatedSegment {
    #[serde(flatten)]
    pub segment: AudioSegment,
    pub source_file: MediaSource,
}

#[derive(Debug, Clone)]
pub struct MediaLocator {
    remote_base: String,
    local_root: PathBuf,
}

impl MediaLocator {
    pub fn new(remote_base: &str, local_root: PathBuf) -> Self {
        MediaLocator {
            remote_base: remote_base.trim_end_matches('/').to_string(),
            local_root,
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(&config.remote_base_url, config.local_media_root.clone())
    }

    pub fn locate(&self, station_id: &str, path: &str, available_locally: bool) -> MediaSource {
        let relative = path.trim_start_matches('/');
        if available_locally {
            MediaSource::Local(self.local_root.join(station_id).join(relative))
        } else {
            MediaSource::Remote(format!("{}/{}/{}", self.remote_base, station_id, relative))
        }
    }

    /// Locate the host and every mix of `item`.
    pub fn locate_item(
        &self,
        station_id: &str,
        item: &PlaylistItem,
        availability: &dyn MediaAvailability,
    ) -> Vec<LocatedSegment> {
        let local = availability.is_available_locally(station_id);
        std::iter::once(&item.track)
            .chain(item.mixes.iter())
            .map(|segment| LocatedSegment {
                segment: segment.clone(),
                source_file: self.locate(station_id, &segment.path, local),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{MediaTime, TimeRange};

    fn locator() -> MediaLocator {
        MediaLocator::new("https://cdn.example.com/radio/", PathBuf::from("/data/media"))
    }

    #[test]
    fn remote_url_joins_station_and_path() {
        assert_eq!(
            locator().locate("rock", "/songs/a.m4a", false),
            MediaSource::Remote("https://cdn.example.com/radio/rock/songs/a.m4a".into())
        );
    }

    #[test]
    fn local_path_lives_under_station_dir() {
        assert_eq!(
            locator().locate("rock", "songs/a.m4a", true),
            MediaSource::Local(PathBuf::from("/data/media/rock/songs/a.m4a"))
        );
    }

    #[test]
    fn item_segments_share_availability() {
        let segment = |id: &str| AudioSegment {
            id: id.into(),
            path: format!("{}.m4a", id),
            source: TimeRange::new(MediaTime::ZERO, MediaTime::from_secs(10)),
            output_start: MediaTime::ZERO,
        };
        let item = PlaylistItem {
            fragment: "song".into(),
            track: segment("host"),
            mixes: vec![segment("vo")],
            markers: Vec::new(),
        };
        let downloaded = |station: &str| station == "rock";
        let located = locator().locate_item("rock", &item, &downloaded);
        assert_eq!(located.len(), 2);
        assert!(located.iter().all(|l| matches!(l.source_file, MediaSource::Local(_))));

        let located = locator().locate_item("jazz", &item, &downloaded);
        assert!(located.iter().all(|l| matches!(l.source_file, MediaSource::Remote(_))));
    }
}
