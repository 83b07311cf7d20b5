//! Rational media time.
//!
//! All timeline arithmetic is done on integer ticks at a fixed rate of
//! 28,224,000 ticks per second, which divides evenly into every common audio
//! sample rate (44.1 kHz → 640 ticks per frame, 48 kHz → 588). Floating point
//! only appears at the edges: catalog durations in seconds and relative
//! voice-over offsets.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Ticks per second.
pub const TIMESCALE: i64 = 28_224_000;

/// A point or span on a media timeline, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    /// One full calendar day.
    pub const DAY: MediaTime = MediaTime(86_400 * TIMESCALE);

    pub const fn from_ticks(ticks: i64) -> Self {
        MediaTime(ticks)
    }

    pub const fn from_secs(secs: i64) -> Self {
        MediaTime(secs * TIMESCALE)
    }

    pub fn from_millis(millis: i64) -> Self {
        MediaTime(millis * (TIMESCALE / 1000))
    }

    /// Convert seconds to ticks, rounding to the nearest tick.
    pub fn from_secs_f64(secs: f64) -> Self {
        MediaTime((secs * TIMESCALE as f64).round() as i64)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / TIMESCALE as f64
    }

    /// Scale by a factor, rounding to the nearest tick.
    pub fn scale(self, factor: f64) -> Self {
        MediaTime((self.0 as f64 * factor).round() as i64)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn max(self, other: Self) -> Self {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }

    /// Format as H:MM:SS.mmm.
    pub fn display_clock(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let ticks = self.0.unsigned_abs();
        let total_ms = ticks / (TIMESCALE as u64 / 1000);
        let ms = total_ms % 1000;
        let secs = total_ms / 1000;
        format!(
            "{}{}:{:02}:{:02}.{:03}",
            sign,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            ms
        )
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_clock())
    }
}

impl Add for MediaTime {
    type Output = MediaTime;
    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0 + rhs.0)
    }
}

impl AddAssign for MediaTime {
    fn add_assign(&mut self, rhs: MediaTime) {
        self.0 += rhs.0;
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;
    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0 - rhs.0)
    }
}

impl SubAssign for MediaTime {
    fn sub_assign(&mut self, rhs: MediaTime) {
        self.0 -= rhs.0;
    }
}

// Catalogs and JSON output express time in seconds.
impl Serialize for MediaTime {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for MediaTime {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(MediaTime::from_secs_f64(secs))
    }
}

/// A half-open span `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: MediaTime,
    pub duration: MediaTime,
}

impl TimeRange {
    pub fn new(start: MediaTime, duration: MediaTime) -> Self {
        TimeRange { start, duration }
    }

    pub fn end(&self) -> MediaTime {
        self.start + self.duration
    }

    pub fn contains(&self, t: MediaTime) -> bool {
        t >= self.start && t < self.end()
    }

    /// Overlap of two ranges, or `None` when it is empty.
    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end().min(other.end());
        if end > start {
            Some(TimeRange::new(start, end - start))
        } else {
            None
        }
    }
}
