//! Compiled playlist rules.
//!
//! `CompiledRules` is the validated, index-based form of a station's
//! `PlaylistRules`: fragment ids become indices, sources become tagged
//! variants, pool sources are dereferenced into draw-pool templates. It is
//! built once per station and never mutated; daily generation works on fresh
//! copies of the pool templates.

use crate::catalog::{Catalog, Condition, SourceSpec, Station, TimeInterval, Transition, TrackList};
use crate::config::SimulatorConfig;
use crate::draw_pool::NonRepeatingRandomizer;
use crate::error::{Result, SimError};
use crate::resolver::{dereference, DereferencedTrack};
use crate::time::{MediaTime, TimeRange};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Which playback option drives the fragment graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Option-less entry and edges only.
    #[default]
    Default,
    /// A single named option.
    Option(String),
    /// Rotate through the available options every `alternateInterval`.
    Alternate,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Default => write!(f, "default"),
            PlaybackMode::Option(name) => write!(f, "{}", name),
            PlaybackMode::Alternate => write!(f, "alternate"),
        }
    }
}

impl PlaybackMode {
    /// Parse a mode: `default`, `alternate`, or any other string as an option name.
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "default" => PlaybackMode::Default,
            "alternate" | "alternating" => PlaybackMode::Alternate,
            _ => PlaybackMode::Option(s.trim().to_string()),
        }
    }
}

/// Key of a draw pool: the fragment or voice-over whose source it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DrawPoolId {
    Fragment(usize),
    VoiceOver { fragment: usize, voice_over: usize },
}

#[derive(Debug, Clone)]
pub enum FragmentSource {
    /// Draw from a non-repeating pool over one or more track lists.
    PoolDraw(DrawPoolId),
    /// Always play this track.
    ExplicitTrack(DereferencedTrack),
    /// Pick one of the parent track's intros found in these candidates.
    IntroPick { candidates: Vec<DereferencedTrack> },
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub target: usize,
    pub weight: f64,
    pub option: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub next_fragment: Option<usize>,
    pub probability: Option<f64>,
    pub time_interval: Option<TimeInterval>,
}

#[derive(Debug, Clone)]
pub struct CompiledVoiceOver {
    pub id: String,
    pub source: FragmentSource,
    pub condition: CompiledCondition,
    /// (position index, relative offset), in order of preference.
    pub positions: Vec<(usize, f64)>,
}

#[derive(Debug, Clone)]
pub struct CompiledFragment {
    pub id: String,
    pub source: FragmentSource,
    pub voice_overs: Vec<CompiledVoiceOver>,
    pub next: Vec<Edge>,
}

/// Fresh, per-generation copies of every draw pool.
pub struct DrawPools {
    pools: HashMap<DrawPoolId, NonRepeatingRandomizer<DereferencedTrack>>,
}

impl DrawPools {
    /// `None` only if `id` was not produced by the same `CompiledRules`.
    pub fn draw(&mut self, id: DrawPoolId, rng: &mut fastrand::Rng) -> Option<DereferencedTrack> {
        self.pools.get_mut(&id).map(|pool| pool.next(rng))
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRules {
    station_id: String,
    fragments: Vec<CompiledFragment>,
    first_fragment: Vec<Edge>,
    position_count: usize,
    available_options: Vec<String>,
    alternate_interval: Option<MediaTime>,
    pools: HashMap<DrawPoolId, NonRepeatingRandomizer<DereferencedTrack>>,
}

struct Compiler<'a> {
    track_lists: HashMap<&'a str, &'a TrackList>,
    fragment_index: HashMap<&'a str, usize>,
    position_index: HashMap<&'a str, (usize, f64)>,
    config: &'a SimulatorConfig,
    pools: HashMap<DrawPoolId, NonRepeatingRandomizer<DereferencedTrack>>,
}

impl CompiledRules {
    /// Compile the rules of `station_id` against the catalog's track lists.
    pub fn compile(catalog: &Catalog, station_id: &str, config: &SimulatorConfig) -> Result<Self> {
        let station = catalog.station(station_id)?;
        Self::compile_station(station, catalog, config)
    }

    pub fn compile_station(
        station: &Station,
        catalog: &Catalog,
        config: &SimulatorConfig,
    ) -> Result<Self> {
        let rules = &station.playlist;

        let mut fragment_index = HashMap::new();
        for (idx, fragment) in rules.fragments.iter().enumerate() {
            if fragment_index.insert(fragment.id.as_str(), idx).is_some() {
                return Err(SimError::DuplicateId(fragment.id.clone()));
            }
        }
        let mut position_index = HashMap::new();
        for (idx, position) in rules.positions.iter().enumerate() {
            if position_index
                .insert(position.id.as_str(), (idx, position.relative_offset))
                .is_some()
            {
                return Err(SimError::DuplicateId(position.id.clone()));
            }
        }

        let mut compiler = Compiler {
            track_lists: catalog.track_list_index(),
            fragment_index,
            position_index,
            config,
            pools: HashMap::new(),
        };

        let mut fragments = Vec::with_capacity(rules.fragments.len());
        for (idx, fragment) in rules.fragments.iter().enumerate() {
            let source = compiler.source(&fragment.id, &fragment.src, DrawPoolId::Fragment(idx))?;
            let mut voice_overs = Vec::with_capacity(fragment.voice_over.len());
            for (vo_idx, vo) in fragment.voice_over.iter().enumerate() {
                let pool_id = DrawPoolId::VoiceOver {
                    fragment: idx,
                    voice_over: vo_idx,
                };
                voice_overs.push(CompiledVoiceOver {
                    id: vo.id.clone(),
                    source: compiler.source(&vo.id, &vo.src, pool_id)?,
                    condition: compiler.condition(&vo.condition)?,
                    positions: compiler.positions(&vo.id, &vo.positions)?,
                });
            }
            fragments.push(CompiledFragment {
                id: fragment.id.clone(),
                source,
                voice_overs,
                next: compiler.edges(&fragment.next)?,
            });
        }

        if rules.first_fragment.is_empty() {
            return Err(SimError::FirstFragmentNotFound(station.id.clone()));
        }
        let first_fragment = compiler.edges(&rules.first_fragment)?;

        debug!(
            station = %station.id,
            fragments = fragments.len(),
            pools = compiler.pools.len(),
            "playlist rules compiled"
        );

        Ok(CompiledRules {
            station_id: station.id.clone(),
            fragments,
            first_fragment,
            position_count: rules.positions.len(),
            available_options: rules.options.available.clone(),
            alternate_interval: rules.options.alternate_interval,
            pools: compiler.pools,
        })
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn fragment(&self, idx: usize) -> &CompiledFragment {
        &self.fragments[idx]
    }

    pub fn fragments(&self) -> &[CompiledFragment] {
        &self.fragments
    }

    pub fn position_count(&self) -> usize {
        self.position_count
    }

    pub fn available_options(&self) -> &[String] {
        &self.available_options
    }

    /// Copies of all draw pools in their initial state.
    pub fn fresh_pools(&self) -> DrawPools {
        DrawPools {
            pools: self.pools.clone(),
        }
    }

    /// Check that `mode` can be played by this station.
    pub fn validate_mode(&self, mode: &PlaybackMode) -> Result<()> {
        match mode {
            PlaybackMode::Default => Ok(()),
            PlaybackMode::Option(name) => {
                if self.available_options.iter().any(|o| o == name) {
                    Ok(())
                } else {
                    Err(SimError::WrongMode(name.clone()))
                }
            }
            PlaybackMode::Alternate => {
                let interval_ok = self.alternate_interval.is_some_and(|i| i.is_positive());
                if interval_ok && !self.available_options.is_empty() {
                    Ok(())
                } else {
                    Err(SimError::WrongMode(mode.to_string()))
                }
            }
        }
    }

    /// The option in force at `elapsed` into the day.
    pub fn active_option<'a>(&'a self, mode: &'a PlaybackMode, elapsed: MediaTime) -> Option<&'a str> {
        match mode {
            PlaybackMode::Default => None,
            PlaybackMode::Option(name) => Some(name.as_str()),
            PlaybackMode::Alternate => {
                let interval = self.alternate_interval.filter(|i| i.is_positive())?;
                if self.available_options.is_empty() {
                    return None;
                }
                let slot = (elapsed.ticks().max(0) / interval.ticks()) as usize;
                Some(self.available_options[slot % self.available_options.len()].as_str())
            }
        }
    }

    /// Roll the entry fragment for the option active at the start of the day.
    pub fn roll_first(&self, mode: &PlaybackMode, rng: &mut fastrand::Rng) -> Result<usize> {
        let active = self.active_option(mode, MediaTime::ZERO);
        let candidates: Vec<&Edge> = self
            .first_fragment
            .iter()
            .filter(|e| e.option.as_deref() == active)
            .collect();
        if candidates.is_empty() {
            return Err(match active {
                Some(option) => SimError::WrongMode(option.to_string()),
                None => SimError::FirstFragmentNotFound(self.station_id.clone()),
            });
        }
        roll(&candidates, rng).ok_or_else(|| SimError::FirstFragmentNotFound(self.station_id.clone()))
    }

    /// Roll the successor of fragment `current` under the active option.
    pub fn roll_next(
        &self,
        current: usize,
        active: Option<&str>,
        rng: &mut fastrand::Rng,
    ) -> Result<usize> {
        let fragment = &self.fragments[current];
        let candidates: Vec<&Edge> = fragment
            .next
            .iter()
            .filter(|e| e.option.is_none() || e.option.as_deref() == active)
            .collect();
        roll(&candidates, rng).ok_or_else(|| SimError::NotExhaustiveFragment(fragment.id.clone()))
    }
}

/// Cumulative-weight selection against one uniform draw in [0, 1).
///
/// Weights are not normalised: lists summing below the draw find no edge.
fn roll(edges: &[&Edge], rng: &mut fastrand::Rng) -> Option<usize> {
    if edges.is_empty() {
        return None;
    }
    let draw = rng.f64();
    let mut cumulative = 0.0;
    for edge in edges {
        cumulative += edge.weight;
        if cumulative >= draw {
            return Some(edge.target);
        }
    }
    None
}

impl<'a> Compiler<'a> {
    fn source(&mut self, owner: &str, spec: &SourceSpec, pool_id: DrawPoolId) -> Result<FragmentSource> {
        let track_lists = spec.track_lists.as_ref().filter(|l| !l.is_empty());
        let intro_lists = spec.intro_track_lists.as_ref().filter(|l| !l.is_empty());
        let populated = [track_lists.is_some(), spec.track.is_some(), intro_lists.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if populated != 1 {
            return Err(SimError::InvalidSource(owner.to_string()));
        }

        if let Some(lists) = track_lists {
            let tracks = self.flatten(lists)?;
            let count = tracks.len();
            let pool = NonRepeatingRandomizer::new(tracks, self.config.avoid_repeats_ratio)
                .ok_or_else(|| SimError::InvalidDrawPool {
                    owner: owner.to_string(),
                    count,
                })?;
            self.pools.insert(pool_id, pool);
            return Ok(FragmentSource::PoolDraw(pool_id));
        }

        if let Some(track) = &spec.track {
            let resolved = dereference(track, &self.track_lists, None, self.config.max_reference_depth)?;
            return Ok(FragmentSource::ExplicitTrack(resolved));
        }

        // Only the intro shape is left.
        let lists = intro_lists.map(|l| l.as_slice()).unwrap_or_default();
        let mut candidates: Vec<DereferencedTrack> = Vec::new();
        for track in self.flatten(lists)? {
            if !candidates.iter().any(|c| c.id == track.id) {
                candidates.push(track);
            }
        }
        Ok(FragmentSource::IntroPick { candidates })
    }

    /// Dereference every track of `lists`, dropping duplicate files.
    fn flatten(&self, lists: &[String]) -> Result<Vec<DereferencedTrack>> {
        let mut seen: HashSet<(String, TimeRange)> = HashSet::new();
        let mut tracks = Vec::new();
        for list_id in lists {
            let list = self
                .track_lists
                .get(list_id.as_str())
                .copied()
                .ok_or_else(|| SimError::TrackListNotFound(list_id.clone()))?;
            for track in &list.tracks {
                let resolved =
                    dereference(track, &self.track_lists, None, self.config.max_reference_depth)?;
                if seen.insert((resolved.path.clone(), resolved.range)) {
                    tracks.push(resolved);
                }
            }
        }
        Ok(tracks)
    }

    fn target(&self, id: &str) -> Result<usize> {
        self.fragment_index
            .get(id)
            .copied()
            .ok_or_else(|| SimError::FragmentNotFound(id.to_string()))
    }

    fn edges(&self, transitions: &[Transition]) -> Result<Vec<Edge>> {
        transitions
            .iter()
            .map(|t| {
                Ok(Edge {
                    target: self.target(&t.fragment)?,
                    weight: t.weight(),
                    option: t.option.clone(),
                })
            })
            .collect()
    }

    fn condition(&self, condition: &Condition) -> Result<CompiledCondition> {
        let next_fragment = match &condition.next_fragment {
            Some(id) => Some(self.target(id)?),
            None => None,
        };
        Ok(CompiledCondition {
            next_fragment,
            probability: condition.probability,
            time_interval: condition.time_interval,
        })
    }

    fn positions(&self, voice_over: &str, names: &[String]) -> Result<Vec<(usize, f64)>> {
        names
            .iter()
            .map(|name| {
                let invalid = || SimError::InvalidPosition {
                    voice_over: voice_over.to_string(),
                    position: name.clone(),
                };
                let (idx, offset) = self.position_index.get(name.as_str()).copied().ok_or_else(invalid)?;
                if !(0.0..=1.0).contains(&offset) {
                    return Err(invalid());
                }
                Ok((idx, offset))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog(playlist: serde_json::Value) -> Catalog {
        let doc = json!({
            "stations": [{"id": "st", "playlist": playlist}],
            "trackLists": [
                {"id": "songs", "tracks": [
                    {"id": "s1", "path": "s1.m4a", "duration": 180.0, "intro": ["i1"]},
                    {"id": "s2", "path": "s2.m4a", "duration": 200.0},
                    {"id": "s3", "path": "s3.m4a", "duration": 210.0}
                ]},
                {"id": "more_songs", "tracks": [
                    {"id": "s1", "path": "s1.m4a", "duration": 180.0},
                    {"id": "s4", "path": "s4.m4a", "duration": 150.0}
                ]},
                {"id": "single", "tracks": [
                    {"id": "x", "path": "x.m4a", "duration": 10.0}
                ]},
                {"id": "intros", "tracks": [
                    {"id": "i1", "path": "i1.m4a", "duration": 5.0},
                    {"id": "i2", "path": "i2.m4a", "duration": 6.0}
                ]}
            ]
        });
        serde_json::from_value(doc).unwrap()
    }

    fn compile(playlist: serde_json::Value) -> Result<CompiledRules> {
        CompiledRules::compile(&catalog(playlist), "st", &SimulatorConfig::default())
    }

    fn song_rules() -> serde_json::Value {
        json!({
            "firstFragment": [
                {"fragment": "song"},
                {"fragment": "talk", "option": "talk"}
            ],
            "fragments": [
                {"id": "song", "src": {"trackLists": ["songs", "more_songs"]},
                 "voiceOver": [{"id": "dj", "src": {"introTrackLists": ["intros"]},
                                "positions": ["begin"]}],
                 "next": [{"fragment": "song", "probability": 0.5},
                          {"fragment": "talk", "probability": 0.5}]},
                {"id": "talk", "src": {"track": {"id": "x", "trackList": "single"}},
                 "next": [{"fragment": "song"}]}
            ],
            "options": {"available": ["talk", "music"], "alternateInterval": 3600},
            "positions": [{"id": "begin", "relativeOffset": 0.0}]
        })
    }

    #[test]
    fn compiles_sources_into_tagged_variants() {
        let rules = compile(song_rules()).unwrap();
        assert!(matches!(
            rules.fragment(0).source,
            FragmentSource::PoolDraw(DrawPoolId::Fragment(0))
        ));
        match &rules.fragment(1).source {
            FragmentSource::ExplicitTrack(track) => assert_eq!(track.path, "x.m4a"),
            other => panic!("unexpected source {:?}", other),
        }
        match &rules.fragment(0).voice_overs[0].source {
            FragmentSource::IntroPick { candidates } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn pool_deduplicates_shared_files() {
        let rules = compile(song_rules()).unwrap();
        // s1 appears in both lists
        let pools = rules.fresh_pools();
        assert_eq!(pools.pools[&DrawPoolId::Fragment(0)].len(), 4);
    }

    #[test]
    fn ambiguous_source_is_rejected() {
        let mut playlist = song_rules();
        playlist["fragments"][1]["src"]["trackLists"] = json!(["songs"]);
        assert!(matches!(compile(playlist), Err(SimError::InvalidSource(id)) if id == "talk"));

        let mut playlist = song_rules();
        playlist["fragments"][1]["src"] = json!({});
        assert!(matches!(compile(playlist), Err(SimError::InvalidSource(_))));
    }

    #[test]
    fn single_track_pool_is_rejected() {
        let mut playlist = song_rules();
        playlist["fragments"][1]["src"] = json!({"trackLists": ["single"]});
        assert!(matches!(
            compile(playlist),
            Err(SimError::InvalidDrawPool { count: 1, .. })
        ));
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let mut playlist = song_rules();
        playlist["fragments"][1]["next"] = json!([{"fragment": "ghost"}]);
        assert!(matches!(compile(playlist), Err(SimError::FragmentNotFound(id)) if id == "ghost"));

        let mut playlist = song_rules();
        playlist["firstFragment"] = json!([]);
        assert!(matches!(compile(playlist), Err(SimError::FirstFragmentNotFound(_))));
    }

    #[test]
    fn unknown_position_is_rejected() {
        let mut playlist = song_rules();
        playlist["fragments"][0]["voiceOver"][0]["positions"] = json!(["end"]);
        assert!(matches!(compile(playlist), Err(SimError::InvalidPosition { .. })));

        let mut playlist = song_rules();
        playlist["positions"] = json!([{"id": "begin", "relativeOffset": 1.5}]);
        assert!(matches!(compile(playlist), Err(SimError::InvalidPosition { .. })));
    }

    #[test]
    fn modes_are_validated() {
        let rules = compile(song_rules()).unwrap();
        assert!(rules.validate_mode(&PlaybackMode::Default).is_ok());
        assert!(rules.validate_mode(&PlaybackMode::Option("talk".into())).is_ok());
        assert!(rules.validate_mode(&PlaybackMode::Alternate).is_ok());
        assert!(matches!(
            rules.validate_mode(&PlaybackMode::Option("jazz".into())),
            Err(SimError::WrongMode(_))
        ));
    }

    #[test]
    fn first_fragment_follows_option() {
        let rules = compile(song_rules()).unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        assert_eq!(rules.roll_first(&PlaybackMode::Default, &mut rng).unwrap(), 0);
        assert_eq!(
            rules.roll_first(&PlaybackMode::Option("talk".into()), &mut rng).unwrap(),
            1
        );
        assert!(matches!(
            rules.roll_first(&PlaybackMode::Option("music".into()), &mut rng),
            Err(SimError::WrongMode(_))
        ));
    }

    #[test]
    fn alternation_rotates_options() {
        let rules = compile(song_rules()).unwrap();
        let mode = PlaybackMode::Alternate;
        assert_eq!(rules.active_option(&mode, MediaTime::ZERO), Some("talk"));
        assert_eq!(rules.active_option(&mode, MediaTime::from_secs(3599)), Some("talk"));
        assert_eq!(rules.active_option(&mode, MediaTime::from_secs(3600)), Some("music"));
        assert_eq!(rules.active_option(&mode, MediaTime::from_secs(7200)), Some("talk"));
        assert_eq!(rules.active_option(&PlaybackMode::Default, MediaTime::ZERO), None);
    }

    #[test]
    fn named_option_is_active_all_day() {
        let rules = compile(song_rules()).unwrap();
        let mode = PlaybackMode::Option("music".into());
        for hour in [0, 1, 13, 23] {
            let active = rules.active_option(&mode, MediaTime::from_secs(hour * 3600));
            assert_eq!(active, Some("music"));
        }
    }

    #[test]
    fn under_weighted_edges_are_not_exhaustive() {
        let mut playlist = song_rules();
        playlist["fragments"][1]["next"] = json!([{"fragment": "song", "probability": 0.0}]);
        let rules = compile(playlist).unwrap();
        let mut rng = fastrand::Rng::with_seed(3);
        // A draw of exactly 0.0 is the only one a zero weight matches.
        let failures = (0..50)
            .filter(|_| rules.roll_next(1, None, &mut rng).is_err())
            .count();
        assert!(failures > 0);
    }

    #[test]
    fn option_tagged_edges_are_skipped_without_option() {
        let mut playlist = song_rules();
        playlist["fragments"][1]["next"] = json!([
            {"fragment": "talk", "option": "talk"},
            {"fragment": "song"}
        ]);
        let rules = compile(playlist).unwrap();
        let mut rng = fastrand::Rng::with_seed(9);
        for _ in 0..20 {
            assert_eq!(rules.roll_next(1, None, &mut rng).unwrap(), 0);
            assert_eq!(rules.roll_next(1, Some("talk"), &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn mode_parsing_is_loose() {
        assert_eq!(PlaybackMode::from_str_loose("Default"), PlaybackMode::Default);
        assert_eq!(PlaybackMode::from_str_loose("alternate"), PlaybackMode::Alternate);
        assert_eq!(
            PlaybackMode::from_str_loose("talk"),
            PlaybackMode::Option("talk".into())
        );
    }
}
