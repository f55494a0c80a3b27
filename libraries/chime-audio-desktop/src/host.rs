//! Desktop platform host

use crate::element::SymphoniaMediaElement;
use crate::output::CpalStreamOutput;
use chime_core::{
    GestureNotifier, MediaElement, MediaType, PlatformHost, PlayerError, StreamOutput,
    UserGestureSource,
};
use std::sync::Arc;

/// Desktop implementation of [`PlatformHost`].
///
/// Audio plays through CPAL; this host has no video primitive. Gestures
/// come from whatever input layer the application wires to
/// [`notify_gesture`](Self::notify_gesture), though desktop playback
/// never actually requires one.
pub struct DesktopHost {
    gestures: Arc<GestureNotifier>,
}

impl DesktopHost {
    /// Create a host with a fresh gesture source
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gestures: Arc::new(GestureNotifier::new()),
        })
    }

    /// Report a qualifying user gesture (click, key press) to players
    pub fn notify_gesture(&self) {
        self.gestures.notify();
    }
}

impl PlatformHost for DesktopHost {
    fn create_media_element(&self, media: MediaType) -> chime_core::Result<Box<dyn MediaElement>> {
        match media {
            MediaType::Audio => Ok(Box::new(SymphoniaMediaElement::new()?)),
            MediaType::Video => Err(PlayerError::unsupported(
                "video playback is not available on the desktop host",
            )),
        }
    }

    fn create_stream_output(&self) -> chime_core::Result<Box<dyn StreamOutput>> {
        Ok(Box::new(CpalStreamOutput::new()?))
    }

    fn gesture_source(&self) -> Arc<dyn UserGestureSource> {
        Arc::clone(&self.gestures) as Arc<dyn UserGestureSource>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_elements_are_not_available() {
        let host = DesktopHost::new();
        let err = host.create_media_element(MediaType::Video).unwrap_err();
        assert!(matches!(err, PlayerError::Unsupported(_)));
    }

    #[test]
    fn gesture_source_is_shared() {
        let host = DesktopHost::new();
        let source = host.gesture_source();
        assert!(!source.gesture_seen());

        host.notify_gesture();
        assert!(source.gesture_seen());
    }
}
