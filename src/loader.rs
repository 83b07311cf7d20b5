//! Item loader: a dedicated worker thread for "what plays now" requests.
//!
//! Generating a day can take a noticeable moment, so the player hands
//! requests to this thread instead of computing on its own. Every request
//! gets a `LoadTicket`; a newer request (station or mode switch) makes all
//! older tickets stale. Stale work is skipped when possible and its results
//! are never delivered. Commit points on the caller's side check
//! `LoaderHandle::commit` for the same reason.

use crate::engine::StationEngine;
use crate::error::{Result, SimError};
use crate::playlist::PlaylistItem;
use crate::rules::PlaybackMode;
use crate::time::MediaTime;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{debug, warn};

// ── Commands & Events ────────────────────────────────────────────────────────

/// Identifies one load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    pub station_id: String,
    pub mode: PlaybackMode,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

enum LoadCmd {
    Load {
        ticket: LoadTicket,
        engine: Arc<StationEngine>,
        day: NaiveDate,
        offset: MediaTime,
    },
    Shutdown,
}

/// Results delivered from the loader thread. Only current tickets are reported.
#[derive(Debug)]
pub enum LoadEvent {
    Loaded {
        ticket: LoadTicket,
        now: PlaylistItem,
        next: Option<PlaylistItem>,
    },
    Failed {
        ticket: LoadTicket,
        error: SimError,
    },
}

impl LoadEvent {
    pub fn ticket(&self) -> &LoadTicket {
        match self {
            LoadEvent::Loaded { ticket, .. } | LoadEvent::Failed { ticket, .. } => ticket,
        }
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Thread-safe handle for submitting requests to the loader.
#[derive(Clone)]
pub struct LoaderHandle {
    tx: mpsc::Sender<LoadCmd>,
    latest: Arc<AtomicU64>,
}

impl LoaderHandle {
    /// Request the item playing `offset` into `day`, superseding earlier requests.
    ///
    /// Fails with `LoaderStopped` once the loader thread has exited.
    pub fn request(
        &self,
        engine: &Arc<StationEngine>,
        mode: PlaybackMode,
        day: NaiveDate,
        offset: MediaTime,
    ) -> Result<LoadTicket> {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = LoadTicket {
            generation,
            station_id: engine.station_id().to_string(),
            mode,
        };
        self.tx
            .send(LoadCmd::Load {
                ticket: ticket.clone(),
                engine: Arc::clone(engine),
                day,
                offset,
            })
            .map_err(|_| SimError::LoaderStopped)?;
        Ok(ticket)
    }

    /// Invalidate every outstanding request.
    pub fn cancel(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        is_current(&self.latest, ticket)
    }

    /// Pass `value` through only if `ticket` is still the latest request.
    pub fn commit<T>(&self, ticket: &LoadTicket, value: T) -> Result<T> {
        if self.is_current(ticket) {
            Ok(value)
        } else {
            Err(SimError::Superseded)
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(LoadCmd::Shutdown);
    }
}

fn is_current(latest: &AtomicU64, ticket: &LoadTicket) -> bool {
    latest.load(Ordering::SeqCst) == ticket.generation
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Spawn the loader on a dedicated thread.
///
/// `on_event` is called from the loader thread for every result that is
/// still current when it is ready.
pub fn spawn_item_loader<F>(on_event: F) -> std::io::Result<LoaderHandle>
where
    F: Fn(LoadEvent) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<LoadCmd>();
    let latest = Arc::new(AtomicU64::new(0));
    let thread_latest = Arc::clone(&latest);

    std::thread::Builder::new()
        .name("item-loader".into())
        .spawn(move || loader_loop(rx, thread_latest, on_event))?;

    Ok(LoaderHandle { tx, latest })
}

fn loader_loop<F>(rx: mpsc::Receiver<LoadCmd>, latest: Arc<AtomicU64>, on_event: F)
where
    F: Fn(LoadEvent),
{
    // Ends on Shutdown or when every handle is dropped.
    while let Ok(cmd) = rx.recv() {
        match cmd {
            LoadCmd::Load {
                ticket,
                engine,
                day,
                offset,
            } => {
                if !is_current(&latest, &ticket) {
                    debug!(generation = ticket.generation, "skipping superseded load");
                    continue;
                }
                let result = engine.now_and_next(day, offset, &ticket.mode);
                if !is_current(&latest, &ticket) {
                    debug!(generation = ticket.generation, "discarding superseded result");
                    continue;
                }
                match result {
                    Ok(Some((now, next))) => on_event(LoadEvent::Loaded { ticket, now, next }),
                    Ok(None) => warn!(station = %ticket.station_id, "no item to load"),
                    Err(error) => on_event(LoadEvent::Failed { ticket, error }),
                }
            }
            LoadCmd::Shutdown => break,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
