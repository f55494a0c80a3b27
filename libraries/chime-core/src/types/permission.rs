/// Autoplay permission vocabulary
use serde::{Deserialize, Serialize};

/// Media type a permission probe or cache entry applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Audio playback
    Audio,
    /// Video playback
    Video,
}

impl MediaType {
    /// Convert to string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of an autoplay policy probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayStatus {
    /// Not probed yet
    #[default]
    Unknown,
    /// Audible playback may start without a user gesture
    Allowed,
    /// Only muted playback may start without a user gesture
    AllowedMuted,
    /// No playback may start without a user gesture
    Disallowed,
}

impl AutoplayStatus {
    /// Convert to string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Allowed => "allowed",
            Self::AllowedMuted => "allowed_muted",
            Self::Disallowed => "disallowed",
        }
    }

    /// Whether some form of unsolicited playback (audible or muted) is
    /// permitted
    #[must_use]
    pub fn can_autoplay(&self) -> bool {
        matches!(self, Self::Allowed | Self::AllowedMuted)
    }
}

impl std::fmt::Display for AutoplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved permission state handed to callers and broadcast on changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResult {
    /// Probe outcome
    pub status: AutoplayStatus,
    /// Whether unsolicited playback is permitted in some form
    pub can_autoplay: bool,
    /// Whether a user gesture is required before playback can start.
    ///
    /// Derived from `status == Disallowed` at probe time; cleared in place
    /// once a user gesture has been observed anywhere on the page.
    pub requires_user_interaction: bool,
    /// Whether unsolicited playback must start muted
    pub requires_muted: bool,
    /// Underlying platform error from a failed probe attempt, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PermissionResult {
    /// Build a result with the flags derived from `status`
    #[must_use]
    pub fn from_status(status: AutoplayStatus) -> Self {
        Self {
            status,
            can_autoplay: status.can_autoplay(),
            requires_user_interaction: status == AutoplayStatus::Disallowed,
            requires_muted: status == AutoplayStatus::AllowedMuted,
            error: None,
        }
    }

    /// Build a result carrying the platform error that caused it
    #[must_use]
    pub fn with_error(status: AutoplayStatus, error: impl Into<String>) -> Self {
        let mut result = Self::from_status(status);
        result.error = Some(error.into());
        result
    }

    /// A result that has not been probed yet
    #[must_use]
    pub fn unknown() -> Self {
        Self::from_status(AutoplayStatus::Unknown)
    }

    /// Clear the interaction requirement after a user gesture was observed.
    ///
    /// Returns true if the flag was set and is now cleared.
    pub fn mark_interaction_seen(&mut self) -> bool {
        let was_required = self.requires_user_interaction;
        self.requires_user_interaction = false;
        was_required
    }
}

impl Default for PermissionResult {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_derive_from_status() {
        let allowed = PermissionResult::from_status(AutoplayStatus::Allowed);
        assert!(allowed.can_autoplay);
        assert!(!allowed.requires_user_interaction);
        assert!(!allowed.requires_muted);

        let muted = PermissionResult::from_status(AutoplayStatus::AllowedMuted);
        assert!(muted.can_autoplay);
        assert!(!muted.requires_user_interaction);
        assert!(muted.requires_muted);

        let blocked = PermissionResult::from_status(AutoplayStatus::Disallowed);
        assert!(!blocked.can_autoplay);
        assert!(blocked.requires_user_interaction);
        assert!(!blocked.requires_muted);
    }

    #[test]
    fn interaction_upgrade() {
        let mut blocked = PermissionResult::from_status(AutoplayStatus::Disallowed);
        assert!(blocked.mark_interaction_seen());
        assert!(!blocked.requires_user_interaction);
        // Status itself stays as probed; only the gate is lifted
        assert_eq!(blocked.status, AutoplayStatus::Disallowed);
        // Second call reports nothing changed
        assert!(!blocked.mark_interaction_seen());
    }

    #[test]
    fn error_attachment() {
        let result =
            PermissionResult::with_error(AutoplayStatus::Disallowed, "NotAllowedError: denied");
        assert_eq!(result.error.as_deref(), Some("NotAllowedError: denied"));
        assert!(result.requires_user_interaction);
    }

    #[test]
    fn serde_skips_absent_error() {
        let result = PermissionResult::from_status(AutoplayStatus::Allowed);
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("error"));
    }
}
