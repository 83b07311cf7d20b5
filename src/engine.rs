//! Per-station generation engine.
//!
//! A `StationEngine` owns one station's compiled rules and a cache of the
//! daily playlists generated from them. Generation is a pure function of
//! (rules, day, mode), so cached days can be evicted and rebuilt at any time,
//! and two threads racing to build the same day produce the same result.

use crate::builder::{build_daily_playlist, time_of_day};
use crate::catalog::Catalog;
use crate::config::SimulatorConfig;
use crate::error::Result;
use crate::playlist::PlaylistItem;
use crate::rules::{CompiledRules, PlaybackMode};
use crate::time::MediaTime;
use crate::window;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

type DayKey = (NaiveDate, PlaybackMode);

/// Daily playlists by (day, mode), evicting the oldest day first.
struct DailyCache {
    entries: HashMap<DayKey, Arc<[PlaylistItem]>>,
    capacity: usize,
}

impl DailyCache {
    fn new(capacity: usize) -> Self {
        DailyCache {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &DayKey) -> Option<Arc<[PlaylistItem]>> {
        self.entries.get(key).cloned()
    }

    /// Insert unless another build got there first; returns the stored value.
    fn insert(&mut self, key: DayKey, items: Arc<[PlaylistItem]>) -> Arc<[PlaylistItem]> {
        let stored = self.entries.entry(key.clone()).or_insert(items).clone();
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .keys()
                .filter(|k| **k != key)
                .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.to_string().cmp(&b.1.to_string())))
                .cloned();
            match oldest {
                Some(evicted) => {
                    debug!(day = %evicted.0, mode = %evicted.1, "evicting daily playlist");
                    self.entries.remove(&evicted);
                }
                None => break,
            }
        }
        stored
    }
}

pub struct StationEngine {
    rules: CompiledRules,
    offset: FixedOffset,
    cache: Mutex<DailyCache>,
}

impl StationEngine {
    /// Compile `station_id` from the catalog.
    pub fn new(catalog: &Catalog, station_id: &str, config: &SimulatorConfig) -> Result<Self> {
        let rules = CompiledRules::compile(catalog, station_id, config)?;
        Self::from_rules(rules, config)
    }

    pub fn from_rules(rules: CompiledRules, config: &SimulatorConfig) -> Result<Self> {
        Ok(StationEngine {
            rules,
            offset: config.require_utc_offset()?,
            cache: Mutex::new(DailyCache::new(config.cache_days)),
        })
    }

    pub fn station_id(&self) -> &str {
        self.rules.station_id()
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    /// The playlist of `day`, generated on first use.
    pub fn daily_playlist(&self, day: NaiveDate, mode: &PlaybackMode) -> Result<Arc<[PlaylistItem]>> {
        let key = (day, mode.clone());
        if let Some(items) = self.lock_cache().get(&key) {
            debug!(station = self.station_id(), %day, %mode, "daily playlist cache hit");
            return Ok(items);
        }
        // Built outside the lock: a duplicate build is wasted work, not an error.
        let items: Arc<[PlaylistItem]> = build_daily_playlist(&self.rules, day, mode, self.offset)?.into();
        Ok(self.lock_cache().insert(key, items))
    }

    /// Number of cached daily playlists.
    pub fn cached_days(&self) -> usize {
        self.lock_cache().entries.len()
    }

    pub fn extract(
        &self,
        day: NaiveDate,
        offset: MediaTime,
        duration: MediaTime,
        mode: &PlaybackMode,
        trim_last: bool,
    ) -> Result<Vec<PlaylistItem>> {
        window::extract(|d| self.daily_playlist(d, mode), day, offset, duration, trim_last)
    }

    pub fn make_playlist_item(
        &self,
        day: NaiveDate,
        offset: MediaTime,
        mode: &PlaybackMode,
    ) -> Result<Option<PlaylistItem>> {
        window::make_playlist_item(|d| self.daily_playlist(d, mode), day, offset)
    }

    pub fn now_and_next(
        &self,
        day: NaiveDate,
        offset: MediaTime,
        mode: &PlaybackMode,
    ) -> Result<Option<(PlaylistItem, Option<PlaylistItem>)>> {
        window::now_and_next(|d| self.daily_playlist(d, mode), day, offset)
    }

    /// Station calendar day and offset into it for a wall-clock instant.
    pub fn day_and_offset(&self, instant: DateTime<Utc>) -> (NaiveDate, MediaTime) {
        let local = instant.with_timezone(&self.offset);
        let midnight = local.date_naive().and_time(chrono::NaiveTime::MIN);
        let since = local.naive_local() - midnight;
        (local.date_naive(), MediaTime::from_millis(since.num_milliseconds()))
    }

    /// What a listener tuning in at `instant` hears.
    pub fn tune_in(&self, instant: DateTime<Utc>, mode: &PlaybackMode) -> Result<Option<PlaylistItem>> {
        let (day, offset) = self.day_and_offset(instant);
        debug!(
            station = self.station_id(),
            %day,
            clock = %time_of_day(offset),
            "tuning in"
        );
        self.make_playlist_item(day, offset, mode)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, DailyCache> {
        // A poisoned cache only holds immutable, reproducible data.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn catalog() -> Catalog {
        serde_json::from_value(json!({
            "stations": [{"id": "st", "playlist": {
                "firstFragment": [{"fragment": "song"}, {"fragment": "talk", "option": "talk"}],
                "fragments": [
                    {"id": "song", "src": {"trackLists": ["songs"]}, "next": [{"fragment": "song"}]},
                    {"id": "talk", "src": {"trackLists": ["talk"]}, "next": [{"fragment": "talk"}]}
                ],
                "options": {"available": ["talk"]}
            }}],
            "trackLists": [
                {"id": "songs", "tracks": [
                    {"id": "a", "path": "a.m4a", "duration": 200.0},
                    {"id": "b", "path": "b.m4a", "duration": 220.0},
                    {"id": "c", "path": "c.m4a", "duration": 190.0}
                ]},
                {"id": "talk", "tracks": [
                    {"id": "t1", "path": "t1.m4a", "duration": 600.0},
                    {"id": "t2", "path": "t2.m4a", "duration": 660.0}
                ]}
            ]
        }))
        .unwrap()
    }

    fn engine(cache_days: usize) -> StationEngine {
        let config = SimulatorConfig {
            cache_days,
            ..SimulatorConfig::default()
        };
        StationEngine::new(&catalog(), "st", &config).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    #[test]
    fn cached_playlist_is_shared() {
        let engine = engine(3);
        let a = engine.daily_playlist(day(3), &PlaybackMode::Default).unwrap();
        let b = engine.daily_playlist(day(3), &PlaybackMode::Default).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cached_days(), 1);
    }

    #[test]
    fn modes_are_cached_separately() {
        let engine = engine(3);
        let music = engine.daily_playlist(day(3), &PlaybackMode::Default).unwrap();
        let talk = engine
            .daily_playlist(day(3), &PlaybackMode::Option("talk".into()))
            .unwrap();
        assert_eq!(music[0].fragment, "song");
        assert_eq!(talk[0].fragment, "talk");
        assert_eq!(engine.cached_days(), 2);
    }

    #[test]
    fn eviction_rebuilds_identically() {
        let engine = engine(2);
        let first = engine.daily_playlist(day(3), &PlaybackMode::Default).unwrap();
        engine.daily_playlist(day(4), &PlaybackMode::Default).unwrap();
        engine.daily_playlist(day(5), &PlaybackMode::Default).unwrap();
        assert_eq!(engine.cached_days(), 2);
        let rebuilt = engine.daily_playlist(day(3), &PlaybackMode::Default).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(&*first, &*rebuilt);
    }

    #[test]
    fn generation_does_not_depend_on_cache_order() {
        let a = engine(3);
        let b = engine(3);
        a.daily_playlist(day(3), &PlaybackMode::Default).unwrap();
        let from_a = a.daily_playlist(day(4), &PlaybackMode::Default).unwrap();
        let from_b = b.daily_playlist(day(4), &PlaybackMode::Default).unwrap();
        assert_eq!(&*from_a, &*from_b);
    }

    #[test]
    fn concurrent_builds_agree() {
        let engine = Arc::new(engine(3));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.daily_playlist(day(3), &PlaybackMode::Default).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(&**r, &*results[0]);
        }
        assert_eq!(engine.cached_days(), 1);
    }

    #[test]
    fn day_and_offset_follow_station_offset() {
        let config = SimulatorConfig {
            utc_offset_minutes: 120,
            ..SimulatorConfig::default()
        };
        let engine = StationEngine::new(&catalog(), "st", &config).unwrap();
        let instant = Utc.with_ymd_and_hms(2025, 5, 3, 23, 30, 0).unwrap();
        let (d, offset) = engine.day_and_offset(instant);
        assert_eq!(d, day(4));
        assert_eq!(offset, MediaTime::from_secs(90 * 60));
    }

    #[test]
    fn tune_in_returns_item_starting_now() {
        let engine = engine(3);
        let instant = Utc.with_ymd_and_hms(2025, 5, 3, 12, 0, 0).unwrap();
        let item = engine.tune_in(instant, &PlaybackMode::Default).unwrap().unwrap();
        assert_eq!(item.start(), MediaTime::ZERO);
        assert!(item.duration().is_positive());
    }

    #[test]
    fn unknown_station_fails() {
        assert!(StationEngine::new(&catalog(), "nope", &SimulatorConfig::default()).is_err());
    }
}
