//! Window extraction.
//!
//! Turns "tune in on `day` at `offset` for `duration`" into a run of trimmed
//! playlist items on an output timeline starting at zero. Daily playlists are
//! supplied by the caller, which lets the session serve them from its cache.

use crate::error::Result;
use crate::playlist::PlaylistItem;
use crate::time::MediaTime;
use chrono::NaiveDate;
use std::sync::Arc;

/// Position inside the concatenated stream of daily playlists.
struct Cursor<F> {
    load: F,
    day: NaiveDate,
    items: Arc<[PlaylistItem]>,
    index: usize,
}

impl<F> Cursor<F>
where
    F: FnMut(NaiveDate) -> Result<Arc<[PlaylistItem]>>,
{
    /// Find the item playing `offset` into `day`, and how far into it that is.
    ///
    /// Offsets past the end of a day's items continue into the following days.
    fn locate(mut load: F, day: NaiveDate, offset: MediaTime) -> Result<Option<(Self, MediaTime)>> {
        let mut day = day;
        let mut offset = offset.max(MediaTime::ZERO);
        let mut items = load(day)?;
        loop {
            let Some(last) = items.last() else {
                return Ok(None);
            };
            if let Some(index) = items.iter().position(|item| item.end() > offset) {
                let into = offset - items[index].start();
                let cursor = Cursor {
                    load,
                    day,
                    items,
                    index,
                };
                return Ok(Some((cursor, into.max(MediaTime::ZERO))));
            }
            offset -= last.end();
            day = next_day(day);
            items = load(day)?;
        }
    }

    fn current(&self) -> &PlaylistItem {
        &self.items[self.index]
    }

    /// Step to the next item, crossing into the next day when needed.
    fn advance(&mut self) -> Result<bool> {
        self.index += 1;
        while self.index >= self.items.len() {
            self.day = next_day(self.day);
            self.items = (self.load)(self.day)?;
            self.index = 0;
            if self.items.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn next_day(day: NaiveDate) -> NaiveDate {
    day.succ_opt().unwrap_or(day)
}

/// Extract `duration` of broadcast starting `offset` into `day`.
///
/// Only the first item is cut at the head. With `trim_last` the final item
/// is cut to end exactly at `duration`; otherwise it plays out in full.
pub fn extract<F>(
    load: F,
    day: NaiveDate,
    offset: MediaTime,
    duration: MediaTime,
    trim_last: bool,
) -> Result<Vec<PlaylistItem>>
where
    F: FnMut(NaiveDate) -> Result<Arc<[PlaylistItem]>>,
{
    let mut window = Vec::new();
    if !duration.is_positive() {
        return Ok(window);
    }
    let Some((mut cursor, into)) = Cursor::locate(load, day, offset)? else {
        return Ok(window);
    };

    let mut head = into;
    let mut filled = MediaTime::ZERO;
    loop {
        let remaining = duration - filled;
        let keep = trim_last.then_some(remaining);
        let item = cursor.current().trimmed(head, keep).rebased(filled);
        filled += item.duration();
        window.push(item);
        head = MediaTime::ZERO;

        if filled >= duration || !cursor.advance()? {
            break;
        }
    }
    Ok(window)
}

/// The item playing `offset` into `day`, cut to start at that instant.
pub fn make_playlist_item<F>(load: F, day: NaiveDate, offset: MediaTime) -> Result<Option<PlaylistItem>>
where
    F: FnMut(NaiveDate) -> Result<Arc<[PlaylistItem]>>,
{
    Ok(Cursor::locate(load, day, offset)?
        .map(|(cursor, into)| cursor.current().trimmed(into, None).rebased(MediaTime::ZERO)))
}

/// The current item (as from `make_playlist_item`) and the one that follows
/// it in full, placed right after it for gapless continuation. Mixes of both
/// are clipped to their host.
pub fn now_and_next<F>(
    load: F,
    day: NaiveDate,
    offset: MediaTime,
) -> Result<Option<(PlaylistItem, Option<PlaylistItem>)>>
where
    F: FnMut(NaiveDate) -> Result<Arc<[PlaylistItem]>>,
{
    let Some((mut cursor, into)) = Cursor::locate(load, day, offset)? else {
        return Ok(None);
    };
    let now = cursor.current().trimmed(into, None).rebased(MediaTime::ZERO);
    let next = if cursor.advance()? {
        Some(cursor.current().trimmed(MediaTime::ZERO, None).rebased(now.end()))
    } else {
        None
    };
    Ok(Some((now, next)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::AudioSegment;
    use crate::time::TimeRange;

    fn secs(s: i64) -> MediaTime {
        MediaTime::from_secs(s)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 3).unwrap()
    }

    /// Each day: tracks of 100s named "<day>-<n>" until 300s are covered.
    fn fake_day(day: NaiveDate) -> Arc<[PlaylistItem]> {
        (0..3)
            .map(|n| PlaylistItem {
                fragment: "song".into(),
                track: AudioSegment {
                    id: format!("{}-{}", day, n),
                    path: format!("{}.m4a", n),
                    source: TimeRange::new(secs(0), secs(100)),
                    output_start: secs(100 * n),
                },
                mixes: Vec::new(),
                markers: Vec::new(),
            })
            .collect()
    }

    fn load(d: NaiveDate) -> Result<Arc<[PlaylistItem]>> {
        Ok(fake_day(d))
    }

    #[test]
    fn head_of_first_item_is_trimmed() {
        let window = extract(load, day(), secs(150), secs(120), false).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].track.id, "2025-05-03-1");
        assert_eq!(window[0].track.source, TimeRange::new(secs(50), secs(50)));
        assert_eq!(window[0].start(), MediaTime::ZERO);
        // Last item plays out in full.
        assert_eq!(window[1].start(), secs(50));
        assert_eq!(window[1].duration(), secs(100));
    }

    #[test]
    fn trim_last_cuts_tail_to_budget() {
        let window = extract(load, day(), secs(150), secs(120), true).unwrap();
        assert_eq!(window[1].duration(), secs(70));
        let total: MediaTime = window.iter().fold(MediaTime::ZERO, |acc, i| acc + i.duration());
        assert_eq!(total, secs(120));
    }

    #[test]
    fn window_crosses_into_next_day() {
        let window = extract(load, day(), secs(250), secs(200), true).unwrap();
        let ids: Vec<_> = window.iter().map(|i| i.track.id.as_str()).collect();
        assert_eq!(ids, vec!["2025-05-03-2", "2025-05-04-0", "2025-05-04-1"]);
        assert_eq!(window[2].duration(), secs(50));
        let mut cursor = MediaTime::ZERO;
        for item in &window {
            assert_eq!(item.start(), cursor);
            cursor = item.end();
        }
    }

    #[test]
    fn offset_past_day_end_carries_over() {
        let item = make_playlist_item(load, day(), secs(310)).unwrap().unwrap();
        assert_eq!(item.track.id, "2025-05-04-0");
        assert_eq!(item.track.source.start, secs(10));
    }

    #[test]
    fn extract_is_idempotent() {
        let a = extract(load, day(), secs(42), secs(500), false).unwrap();
        let b = extract(load, day(), secs(42), secs(500), false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_duration_is_empty() {
        assert!(extract(load, day(), secs(10), MediaTime::ZERO, true).unwrap().is_empty());
    }

    #[test]
    fn exact_item_boundary_starts_next_item() {
        let item = make_playlist_item(load, day(), secs(100)).unwrap().unwrap();
        assert_eq!(item.track.id, "2025-05-03-1");
        assert_eq!(item.track.source.start, MediaTime::ZERO);
    }

    #[test]
    fn now_and_next_is_gapless() {
        let (now, next) = now_and_next(load, day(), secs(280)).unwrap().unwrap();
        assert_eq!(now.duration(), secs(20));
        let next = next.unwrap();
        assert_eq!(next.track.id, "2025-05-04-0");
        assert_eq!(next.start(), now.end());
    }

    #[test]
    fn next_item_mix_is_clipped_to_host() {
        // 50 s host, then a 5 s host carrying a 20 s voice-over at its start.
        let short_host = |_: NaiveDate| -> Result<Arc<[PlaylistItem]>> {
            let segment = |id: &str, start: i64, len: i64| AudioSegment {
                id: id.into(),
                path: format!("{}.m4a", id),
                source: TimeRange::new(secs(0), secs(len)),
                output_start: secs(start),
            };
            Ok(Arc::from(vec![
                PlaylistItem {
                    fragment: "song".into(),
                    track: segment("long", 0, 50),
                    mixes: Vec::new(),
                    markers: Vec::new(),
                },
                PlaylistItem {
                    fragment: "jingle".into(),
                    track: segment("short", 50, 5),
                    mixes: vec![segment("voice", 50, 20)],
                    markers: Vec::new(),
                },
            ]))
        };
        let (now, next) = now_and_next(short_host, day(), secs(10)).unwrap().unwrap();
        let next = next.unwrap();
        assert_eq!(next.start(), now.end());
        assert_eq!(next.mixes.len(), 1);
        assert_eq!(next.mixes[0].output_range(), next.track.output_range());
        assert_eq!(next.mixes[0].source, TimeRange::new(secs(0), secs(5)));
    }

    #[test]
    fn empty_days_yield_nothing() {
        let empty = |_: NaiveDate| -> Result<Arc<[PlaylistItem]>> { Ok(Arc::from(Vec::new())) };
        assert!(make_playlist_item(empty, day(), secs(5)).unwrap().is_none());
        assert!(extract(empty, day(), secs(5), secs(10), false).unwrap().is_empty());
    }
}
