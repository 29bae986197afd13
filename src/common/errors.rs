use thiserror::Error;

/// Everything that can go wrong between user input and audible output.
///
/// `InvalidState` is always surfaced as a no-op message; it never tears a
/// session down. `Playback` is absorbed by the orchestrator's auto-advance
/// loop until the consecutive-failure ceiling is reached.
#[derive(Debug, Clone, Error)]
pub enum PlayerError {
    /// Recognized platform, but a reference shape we cannot expand
    /// (e.g. a Spotify album without API credentials).
    #[error("unsupported reference: {0}")]
    UnsupportedReference(String),

    /// The extraction backend produced zero usable entries.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// The metadata provider failed upstream.
    #[error("metadata provider error: {0}")]
    Upstream(String),

    /// The audio pipeline refused the stream or errored mid-stream.
    #[error("playback failed: {0}")]
    Playback(String),

    /// Command issued while the session preconditions do not hold.
    #[error("{0}")]
    InvalidState(String),
}

impl From<reqwest::Error> for PlayerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}
