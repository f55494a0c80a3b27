/// Playback state machine vocabulary
use serde::{Deserialize, Serialize};

/// Lifecycle state of one player instance.
///
/// Exactly one state is active at a time; the engine's transition table is
/// the only legal way to move between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing loaded, nothing playing
    #[default]
    Idle,
    /// Resources are being prepared or a start attempt is in flight
    Loading,
    /// Output is running (audible or muted)
    Playing,
    /// Output suspended by an explicit pause
    Paused,
    /// Media or stream finished naturally
    Ended,
    /// An unrecoverable error ended the session
    Error,
    /// Start was blocked by autoplay policy; a user gesture will retry
    WaitingForInteraction,
}

impl PlaybackState {
    /// Convert to string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Ended => "ended",
            Self::Error => "error",
            Self::WaitingForInteraction => "waiting_for_interaction",
        }
    }

    /// Parse from string
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "loading" => Some(Self::Loading),
            "playing" => Some(Self::Playing),
            "paused" => Some(Self::Paused),
            "ended" => Some(Self::Ended),
            "error" => Some(Self::Error),
            "waiting_for_interaction" => Some(Self::WaitingForInteraction),
            _ => None,
        }
    }

    /// Whether the current session has finished (`Ended` or `Error`).
    ///
    /// Terminal states are still resumable by issuing a fresh play or
    /// stream start, which resets through `Idle` → `Loading`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let states = [
            PlaybackState::Idle,
            PlaybackState::Loading,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Ended,
            PlaybackState::Error,
            PlaybackState::WaitingForInteraction,
        ];
        for state in states {
            assert_eq!(PlaybackState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(PlaybackState::from_str("bogus"), None);
    }

    #[test]
    fn default_is_idle() {
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
    }

    #[test]
    fn terminal_states() {
        assert!(PlaybackState::Ended.is_terminal());
        assert!(PlaybackState::Error.is_terminal());
        assert!(!PlaybackState::Playing.is_terminal());
        assert!(!PlaybackState::WaitingForInteraction.is_terminal());
    }

    #[test]
    fn serde_representation() {
        let json = serde_json::to_string(&PlaybackState::WaitingForInteraction).unwrap();
        assert_eq!(json, "\"waiting_for_interaction\"");
        let back: PlaybackState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PlaybackState::WaitingForInteraction);
    }
}
