//! Error types for playlist generation.
//!
//! Every variant except `Superseded` describes a catalog authoring defect or a
//! degenerate input. None of them are retried internally.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Station '{0}' not found in catalog")]
    StationNotFound(String),

    #[error("Fragment '{0}' not found")]
    FragmentNotFound(String),

    #[error("Track list '{0}' not found")]
    TrackListNotFound(String),

    #[error("Track '{track}' not found in track list '{track_list}'")]
    TrackNotFoundInTrackList { track: String, track_list: String },

    #[error("Track '{0}' has neither a path and duration nor a track list reference")]
    MissingPathOrDuration(String),

    #[error("Track '{0}' has an invalid duration or start")]
    InvalidDuration(String),

    #[error("Source of '{0}' must declare exactly one of trackLists, track, introTrackLists")]
    InvalidSource(String),

    #[error("Draw pool for '{owner}' has {count} eligible tracks (at least 2 required)")]
    InvalidDrawPool { owner: String, count: usize },

    #[error("Transitions of fragment '{0}' are not exhaustive")]
    NotExhaustiveFragment(String),

    #[error("Invalid position '{position}' for voice-over '{voice_over}'")]
    InvalidPosition { voice_over: String, position: String },

    #[error("No first fragment for station '{0}'")]
    FirstFragmentNotFound(String),

    #[error("Playback mode '{0}' is not available")]
    WrongMode(String),

    #[error("Track '{0}' has no usable intro")]
    MissingIntro(String),

    #[error("Reference cycle while dereferencing track '{0}'")]
    CycleDetected(String),

    #[error("Reference chain of track '{track}' exceeds {max_depth} hops")]
    DepthExceeded { track: String, max_depth: usize },

    #[error("Duplicate id '{0}'")]
    DuplicateId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The request was replaced by a newer one before its result was committed.
    #[error("Request superseded")]
    Superseded,

    #[error("Item loader is not running")]
    LoaderStopped,

    #[error("Catalog parse error: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Whether this error is a cancellation rather than a catalog failure.
    pub fn is_superseded(&self) -> bool {
        matches!(self, SimError::Superseded)
    }
}
