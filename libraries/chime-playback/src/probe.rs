//! Autoplay policy probe
//!
//! Answers "may playback start right now without a user gesture?" by
//! actually trying: a throwaway media element loads a short silent clip,
//! starts it muted (the widest autoplay gate), then attempts to unmute.
//! The element is torn down on every path, so the probe leaves no
//! playback behind.

use chime_core::types::{AutoplayStatus, MediaType, PermissionResult, StreamFormat};
use chime_core::{wav, MediaSource, PlatformHost, PlayerError};
use tracing::debug;

/// Duration of the silent probe clip in milliseconds
const PROBE_CLIP_MS: u32 = 50;

/// Run a probe against the host.
///
/// With `muted_only` the unmute upgrade is skipped and the best
/// achievable outcome is [`AutoplayStatus::AllowedMuted`]; used when the
/// caller has already decided to start muted and only needs to know
/// whether even that is permitted.
pub(crate) async fn run(
    host: &dyn PlatformHost,
    media: MediaType,
    muted_only: bool,
) -> PermissionResult {
    let mut element = match host.create_media_element(media) {
        Ok(element) => element,
        Err(err) => {
            // No playback primitive at all; autoplay is moot
            debug!("Probe for {} found no media element: {}", media, err);
            return PermissionResult::with_error(AutoplayStatus::Disallowed, err.to_string());
        }
    };

    let clip = wav::silent_wav(PROBE_CLIP_MS, StreamFormat::speech_mono());
    if let Err(err) = element.load(MediaSource::Bytes(clip)).await {
        debug!("Probe clip failed to load: {}", err);
        return PermissionResult::with_error(AutoplayStatus::Disallowed, err.to_string());
    }

    element.set_muted(true);
    if let Err(err) = element.start().await {
        element.stop();
        debug!("Probe for {}: muted start rejected: {}", media, err);
        return PermissionResult::with_error(AutoplayStatus::Disallowed, err.to_string());
    }

    if muted_only {
        element.stop();
        return PermissionResult::from_status(AutoplayStatus::AllowedMuted);
    }

    // Muted playback is running; see whether audible playback is too
    element.set_muted(false);
    element.set_volume(1.0);
    let result = match element.start().await {
        Ok(()) => PermissionResult::from_status(AutoplayStatus::Allowed),
        Err(PlayerError::PolicyBlocked(_)) => {
            PermissionResult::from_status(AutoplayStatus::AllowedMuted)
        }
        // Muted start already succeeded, so keep that outcome and record
        // what the unmute attempt hit
        Err(err) => PermissionResult::with_error(AutoplayStatus::AllowedMuted, err.to_string()),
    };
    element.stop();
    debug!("Probe for {} resolved: {}", media, result.status);
    result
}
