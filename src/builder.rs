//! Daily playlist generation.
//!
//! A day's broadcast is a walk over the fragment graph seeded from the
//! instant the day starts, so the same station, day and mode always yield the
//! same items. Each step resolves the current fragment to a host track,
//! rolls the successor, attaches voice-overs and advances the clock by the
//! host's duration until a full day is covered.

use crate::error::{Result, SimError};
use crate::playlist::{AudioSegment, PlaylistItem};
use crate::resolver::DereferencedTrack;
use crate::rules::{CompiledCondition, CompiledFragment, CompiledRules, DrawPools, FragmentSource, PlaybackMode};
use crate::time::{MediaTime, TIMESCALE};
use chrono::{FixedOffset, NaiveDate, NaiveTime};
use tracing::{debug, info};

/// Seed for a day: the Unix timestamp of its first instant at `offset`.
pub fn day_seed(day: NaiveDate, offset: FixedOffset) -> u64 {
    let midnight = day.and_time(NaiveTime::MIN).and_utc().timestamp();
    (midnight - offset.local_minus_utc() as i64) as u64
}

/// Time of day reached `elapsed` after midnight.
pub fn time_of_day(elapsed: MediaTime) -> NaiveTime {
    let ticks = elapsed.ticks().rem_euclid(MediaTime::DAY.ticks());
    let secs = (ticks / TIMESCALE) as u32;
    let nanos = ((ticks % TIMESCALE) * 1_000_000_000 / TIMESCALE) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos).unwrap_or(NaiveTime::MIN)
}

/// Generate the full broadcast of `day`.
///
/// The last item usually runs past midnight; the next day starts over from
/// its own seed.
pub fn build_daily_playlist(
    rules: &CompiledRules,
    day: NaiveDate,
    mode: &PlaybackMode,
    offset: FixedOffset,
) -> Result<Vec<PlaylistItem>> {
    rules.validate_mode(mode)?;

    let mut rng = fastrand::Rng::with_seed(day_seed(day, offset));
    let mut pools = rules.fresh_pools();
    let mut current = rules.roll_first(mode, &mut rng)?;
    let mut elapsed = MediaTime::ZERO;
    let mut previous: Option<DereferencedTrack> = None;
    let mut items = Vec::new();

    while elapsed < MediaTime::DAY {
        let fragment = rules.fragment(current);
        let host = resolve(&fragment.source, &fragment.id, previous.as_ref(), &mut pools, &mut rng)?;

        let next_start = elapsed + host.duration();
        let next = rules.roll_next(current, rules.active_option(mode, next_start), &mut rng)?;

        let mixes = mix_voice_overs(rules, fragment, &host, next, elapsed, &mut pools, &mut rng)?;
        items.push(PlaylistItem::new(&fragment.id, &host, elapsed, mixes));

        elapsed = next_start;
        previous = Some(host);
        current = next;
    }

    info!(
        station = rules.station_id(),
        %day,
        %mode,
        items = items.len(),
        total = %elapsed,
        "daily playlist built"
    );
    Ok(items)
}

/// Resolve a source to one playable track.
///
/// `parent` is the track an intro is picked for: the previous host for
/// fragments, the current host for voice-overs.
fn resolve(
    source: &FragmentSource,
    owner: &str,
    parent: Option<&DereferencedTrack>,
    pools: &mut DrawPools,
    rng: &mut fastrand::Rng,
) -> Result<DereferencedTrack> {
    match source {
        FragmentSource::PoolDraw(id) => pools.draw(*id, rng).ok_or_else(|| SimError::InvalidDrawPool {
            owner: owner.to_string(),
            count: 0,
        }),
        FragmentSource::ExplicitTrack(track) => Ok(track.clone()),
        FragmentSource::IntroPick { candidates } => {
            let parent = parent.ok_or_else(|| SimError::MissingIntro(owner.to_string()))?;
            let mut usable: Vec<&DereferencedTrack> = Vec::new();
            for intro_id in &parent.intro {
                if let Some(candidate) = candidates.iter().find(|c| &c.id == intro_id) {
                    if !usable.iter().any(|u| u.id == candidate.id) {
                        usable.push(candidate);
                    }
                }
            }
            if usable.is_empty() {
                return Err(SimError::MissingIntro(parent.id.clone()));
            }
            Ok(usable[rng.usize(..usable.len())].clone())
        }
    }
}

fn condition_holds(
    condition: &CompiledCondition,
    next: usize,
    elapsed: MediaTime,
    rng: &mut fastrand::Rng,
) -> bool {
    if condition.next_fragment.is_some_and(|f| f != next) {
        return false;
    }
    if let Some(interval) = &condition.time_interval {
        if !interval.contains(time_of_day(elapsed)) {
            return false;
        }
    }
    match condition.probability {
        Some(p) => rng.f64() < p,
        None => true,
    }
}

fn mix_voice_overs(
    rules: &CompiledRules,
    fragment: &CompiledFragment,
    host: &DereferencedTrack,
    next: usize,
    start: MediaTime,
    pools: &mut DrawPools,
    rng: &mut fastrand::Rng,
) -> Result<Vec<AudioSegment>> {
    let mut claimed = vec![false; rules.position_count()];
    let mut mixes = Vec::new();

    for voice_over in &fragment.voice_overs {
        if !condition_holds(&voice_over.condition, next, start, rng) {
            continue;
        }
        let Some(&(position, relative_offset)) =
            voice_over.positions.iter().find(|(idx, _)| !claimed[*idx])
        else {
            debug!(voice_over = %voice_over.id, "all positions taken");
            continue;
        };
        claimed[position] = true;

        let mix = resolve(&voice_over.source, &voice_over.id, Some(host), pools, rng)?;
        let slack = (host.duration() - mix.duration()).max(MediaTime::ZERO);
        mixes.push(AudioSegment::from_track(&mix, start + slack.scale(relative_offset)));
    }
    Ok(mixes)
}
