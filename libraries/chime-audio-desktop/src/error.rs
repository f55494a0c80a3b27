/// Desktop audio errors
use chime_core::PlayerError;
use thiserror::Error;

/// Result type for desktop audio operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Errors raised by the CPAL/Symphonia host adapter
#[derive(Debug, Error)]
pub enum AudioError {
    /// No output device is available
    #[error("Audio device not found")]
    DeviceNotFound,

    /// Failed to build the output stream
    #[error("Failed to build output stream: {0}")]
    StreamBuild(String),

    /// Failed to start or pause the output stream
    #[error("Failed to control output stream: {0}")]
    StreamControl(String),

    /// Decoding failed or the container is not playable
    #[error("Failed to decode media: {0}")]
    Decode(String),

    /// Sample rate conversion error
    #[error("Sample rate conversion error: {0}")]
    Resample(String),

    /// Source kind not playable on this host
    #[error("Unsupported media source: {0}")]
    UnsupportedSource(String),

    /// The audio thread is no longer running
    #[error("Audio thread unavailable: {0}")]
    ThreadGone(String),
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        Self::StreamBuild(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        Self::StreamBuild(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::StreamControl(err.to_string())
    }
}

impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        Self::StreamControl(err.to_string())
    }
}

impl From<AudioError> for PlayerError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::DeviceNotFound => PlayerError::unsupported("no audio output device"),
            AudioError::UnsupportedSource(msg) => PlayerError::unsupported(msg),
            AudioError::Decode(msg) => PlayerError::media_load(msg),
            AudioError::Resample(msg) => PlayerError::media_load(msg),
            other => PlayerError::output(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(AudioError::DeviceNotFound.to_string(), "Audio device not found");
        assert_eq!(
            AudioError::Decode("bad header".into()).to_string(),
            "Failed to decode media: bad header"
        );
    }

    #[test]
    fn missing_device_maps_to_unsupported() {
        let err: PlayerError = AudioError::DeviceNotFound.into();
        assert!(matches!(err, PlayerError::Unsupported(_)));
    }

    #[test]
    fn decode_failures_map_to_media_load() {
        let err: PlayerError = AudioError::Decode("truncated".into()).into();
        assert!(matches!(err, PlayerError::MediaLoad(_)));
        let err: PlayerError = AudioError::Resample("ratio out of range".into()).into();
        assert!(matches!(err, PlayerError::MediaLoad(_)));
    }

    #[test]
    fn stream_failures_map_to_output() {
        let err: PlayerError = AudioError::StreamBuild("format rejected".into()).into();
        assert!(matches!(err, PlayerError::Output(_)));
        let err: PlayerError = AudioError::ThreadGone("stopped".into()).into();
        assert!(matches!(err, PlayerError::Output(_)));
    }
}
