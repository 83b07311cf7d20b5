use crate::catalog::Marker;
use crate::resolver::DereferencedTrack;
use crate::time::{MediaTime, TimeRange};
use serde::{Deserialize, Serialize};

/// A span of one audio file placed on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Id of the catalog track the segment was resolved from.
    pub id: String,
    pub path: String,
    /// Range played from the file.
    pub source: TimeRange,
    /// Where the segment starts on the output timeline.
    pub output_start: MediaTime,
}

impl AudioSegment {
    pub fn from_track(track: &DereferencedTrack, output_start: MediaTime) -> Self {
        AudioSegment {
            id: track.id.clone(),
            path: track.path.clone(),
            source: track.range,
            output_start,
        }
    }

    pub fn duration(&self) -> MediaTime {
        self.source.duration
    }

    /// The segment's span on the output timeline.
    pub fn output_range(&self) -> TimeRange {
        TimeRange::new(self.output_start, self.source.duration)
    }

    /// Restrict to `window` (output time). `None` when nothing overlaps.
    pub fn clip(&self, window: &TimeRange) -> Option<AudioSegment> {
        let overlap = self.output_range().intersection(window)?;
        let skipped = overlap.start - self.output_start;
        Some(AudioSegment {
            id: self.id.clone(),
            path: self.path.clone(),
            source: TimeRange::new(self.source.start + skipped, overlap.duration),
            output_start: overlap.start,
        })
    }

    fn shifted(mut self, by: MediaTime) -> Self {
        self.output_start += by;
        self
    }
}

/// One host track of the broadcast plus the voice-overs mixed on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Fragment that produced this item.
    pub fragment: String,
    pub track: AudioSegment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixes: Vec<AudioSegment>,
    /// Now-playing changepoints, relative to the start of `track`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<Marker>,
}

impl PlaylistItem {
    pub fn new(fragment: &str, track: &DereferencedTrack, start: MediaTime, mixes: Vec<AudioSegment>) -> Self {
        let mut markers = track.markers.clone();
        markers.sort_by_key(|m| m.offset);
        PlaylistItem {
            fragment: fragment.to_string(),
            track: AudioSegment::from_track(track, start),
            mixes,
            markers,
        }
    }

    pub fn start(&self) -> MediaTime {
        self.track.output_start
    }

    pub fn duration(&self) -> MediaTime {
        self.track.duration()
    }

    pub fn end(&self) -> MediaTime {
        self.track.output_range().end()
    }

    /// Cut `head` off the front and keep at most `keep` of what remains.
    ///
    /// Mixes are clipped to the surviving host span and dropped when nothing
    /// of them is left. Output times stay on the original timeline.
    pub fn trimmed(&self, head: MediaTime, keep: Option<MediaTime>) -> PlaylistItem {
        let head = head.max(MediaTime::ZERO).min(self.duration());
        let mut duration = self.duration() - head;
        if let Some(keep) = keep {
            duration = duration.min(keep.max(MediaTime::ZERO));
        }
        let window = TimeRange::new(self.start() + head, duration);

        let track = AudioSegment {
            id: self.track.id.clone(),
            path: self.track.path.clone(),
            source: TimeRange::new(self.track.source.start + head, duration),
            output_start: window.start,
        };
        let mixes = self.mixes.iter().filter_map(|mix| mix.clip(&window)).collect();

        PlaylistItem {
            fragment: self.fragment.clone(),
            track,
            mixes,
            markers: trim_markers(&self.markers, head, duration),
        }
    }

    /// Move the item so that it starts at `start`.
    pub fn rebased(self, start: MediaTime) -> PlaylistItem {
        let by = start - self.start();
        PlaylistItem {
            fragment: self.fragment,
            track: self.track.shifted(by),
            mixes: self.mixes.into_iter().map(|m| m.shifted(by)).collect(),
            markers: self.markers,
        }
    }
}

/// Keep the marker in effect at `head` (moved to 0) and those inside the
/// surviving span, relative to the new start.
pub fn trim_markers(markers: &[Marker], head: MediaTime, duration: MediaTime) -> Vec<Marker> {
    let mut trimmed = Vec::new();
    if let Some(current) = markers.iter().rev().find(|m| m.offset <= head) {
        trimmed.push(Marker {
            offset: MediaTime::ZERO,
            ..current.clone()
        });
    }
    trimmed.extend(
        markers
            .iter()
            .filter(|m| m.offset > head && m.offset - head < duration)
            .map(|m| Marker {
                offset: m.offset - head,
                ..m.clone()
            }),
    );
    trimmed
}

/// Total playing time of a run of consecutive items.
pub fn total_duration(items: &[PlaylistItem]) -> MediaTime {
    match (items.first(), items.last()) {
        (Some(first), Some(last)) => last.end() - first.start(),
        _ => MediaTime::ZERO,
    }
}
