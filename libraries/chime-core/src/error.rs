//! Error types shared across the Chime playback crates

use thiserror::Error;

/// Result type alias using `PlayerError`
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Unified error type for playback operations.
///
/// `Clone` so a failure can resolve a deferred play request and still be
/// returned to the direct caller.
#[derive(Debug, Clone, Error)]
pub enum PlayerError {
    /// The host platform lacks a required capability (no real-time output,
    /// no media element support). Fatal for the invoked operation only.
    #[error("Unsupported on this host: {0}")]
    Unsupported(String),

    /// Chunk or blob input with an unrecognized binary layout
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Resource or metadata failed to load
    #[error("Media failed to load: {0}")]
    MediaLoad(String),

    /// Playback start rejected by the platform autoplay policy.
    ///
    /// Never surfaced on the facade's primary call path; it is routed
    /// through the deferred-retry protocol instead.
    #[error("Playback blocked by autoplay policy: {0}")]
    PolicyBlocked(String),

    /// `start_stream` called while a stream is already active
    #[error("A stream is already active on this player")]
    AlreadyStreaming,

    /// Stream operation invoked with no active stream
    #[error("No active stream on this player")]
    NotStreaming,

    /// A newer deferred play request replaced this one
    #[error("Play request superseded by a newer request")]
    Superseded,

    /// The player instance was destroyed
    #[error("Player has been destroyed")]
    Destroyed,

    /// Host audio output failure
    #[error("Audio output error: {0}")]
    Output(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl PlayerError {
    /// Create an unsupported-capability error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an unsupported-format error
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create a media-load error
    pub fn media_load(msg: impl Into<String>) -> Self {
        Self::MediaLoad(msg.into())
    }

    /// Create a policy-blocked error
    pub fn policy_blocked(msg: impl Into<String>) -> Self {
        Self::PolicyBlocked(msg.into())
    }

    /// Create an output error
    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    /// Whether this error is an autoplay-policy rejection
    #[must_use]
    pub fn is_policy_blocked(&self) -> bool {
        matches!(self, Self::PolicyBlocked(_))
    }
}
