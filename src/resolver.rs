//! Track dereferencing.
//!
//! A track may point into another track list instead of carrying its own
//! file. Following those links until a terminal track is found yields a
//! `DereferencedTrack`. The intro set travels forward along the chain: the
//! first non-empty one wins.

use crate::catalog::{Marker, Track, TrackList};
use crate::error::{Result, SimError};
use crate::time::{MediaTime, TimeRange};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Default bound on reference hops.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// A concretely playable track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DereferencedTrack {
    /// Id of the track the chain started from.
    pub id: String,
    pub path: String,
    /// Playable range inside the file.
    pub range: TimeRange,
    pub intro: Vec<String>,
    pub markers: Vec<Marker>,
}

impl DereferencedTrack {
    pub fn duration(&self) -> MediaTime {
        self.range.duration
    }
}

/// Follow `track` through track-list references until a terminal track.
///
/// `reference_intro` is an intro set inherited from a caller further up the
/// chain; it is only used when `track` itself declares none.
pub fn dereference(
    track: &Track,
    track_lists: &HashMap<&str, &TrackList>,
    reference_intro: Option<&[String]>,
    max_depth: usize,
) -> Result<DereferencedTrack> {
    let mut visited: HashSet<(&str, &str)> = HashSet::new();
    let mut current = track;
    let mut intro: Option<&[String]> = if track.intro.is_empty() {
        reference_intro.filter(|i| !i.is_empty())
    } else {
        Some(track.intro.as_slice())
    };
    let mut hops = 0;

    loop {
        let Some(list_id) = current.track_list.as_deref() else {
            return terminal(track, current, intro);
        };

        if !visited.insert((list_id, current.id.as_str())) {
            return Err(SimError::CycleDetected(track.id.clone()));
        }
        hops += 1;
        if hops > max_depth {
            return Err(SimError::DepthExceeded {
                track: track.id.clone(),
                max_depth,
            });
        }

        let list = track_lists
            .get(list_id)
            .copied()
            .ok_or_else(|| SimError::TrackListNotFound(list_id.to_string()))?;
        current = list
            .find(&current.id)
            .ok_or_else(|| SimError::TrackNotFoundInTrackList {
                track: current.id.clone(),
                track_list: list_id.to_string(),
            })?;

        if intro.is_none() && !current.intro.is_empty() {
            intro = Some(current.intro.as_slice());
        }
    }
}

fn terminal(
    origin: &Track,
    track: &Track,
    intro: Option<&[String]>,
) -> Result<DereferencedTrack> {
    let (Some(path), Some(duration)) = (track.path.as_ref(), track.duration) else {
        return Err(SimError::MissingPathOrDuration(track.id.clone()));
    };
    // One item never spans more than a day.
    if !duration.is_positive() || duration > MediaTime::DAY || track.start < MediaTime::ZERO {
        return Err(SimError::InvalidDuration(track.id.clone()));
    }
    Ok(DereferencedTrack {
        id: origin.id.clone(),
        path: path.clone(),
        range: TimeRange::new(track.start, duration),
        intro: intro.map(|i| i.to_vec()).unwrap_or_default(),
        markers: track.markers.clone(),
    })
}
