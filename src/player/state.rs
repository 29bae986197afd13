use serde::{Deserialize, Serialize};

use crate::player::track::TrackInfo;

/// Authoritative playback state of one session. Exactly one value at any
/// instant; every transition happens on the session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    Idle,
    /// A track has been dequeued and its stream is being resolved.
    Starting,
    Playing,
    Paused,
    /// Teardown in progress; no further transitions accepted.
    Stopping,
}

impl PlaybackState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Playing | Self::Paused)
    }
}

/// Point-in-time view of a session, as returned by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: PlaybackState,
    pub now_playing: Option<TrackInfo>,
    pub queue: Vec<TrackInfo>,
    pub loop_enabled: bool,
}

/// Session notifications for the outer chat layer to render.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackStarted(TrackInfo),
    TrackEnded(TrackInfo),
    /// One auto-advance skip; the session keeps going.
    TrackFailed { track: TrackInfo, message: String },
    QueueFinished,
    /// Consecutive-failure ceiling reached; session reverted to idle with
    /// its remaining queue intact.
    SessionFailed { message: String },
}
