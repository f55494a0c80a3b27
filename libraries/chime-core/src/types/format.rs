/// Stream format types
use serde::{Deserialize, Serialize};

/// Sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRate(pub u32);

impl SampleRate {
    /// Common sample rates
    pub const SPEECH: Self = Self(16_000);
    pub const CD_QUALITY: Self = Self(44_100);
    pub const DVD_QUALITY: Self = Self(48_000);

    /// Create a new sample rate
    #[must_use]
    pub fn new(hz: u32) -> Self {
        Self(hz)
    }

    /// Get the sample rate as Hz
    pub fn as_hz(&self) -> u32 {
        self.0
    }
}

/// Format of a real-time sample stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sample rate of the stream
    pub sample_rate: SampleRate,

    /// Number of channels (1 = mono, 2 = stereo, etc.)
    pub channels: u16,
}

impl StreamFormat {
    /// Create a new stream format
    pub fn new(sample_rate: SampleRate, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// 16 kHz mono, the common format for synthesized speech streams
    pub fn speech_mono() -> Self {
        Self {
            sample_rate: SampleRate::SPEECH,
            channels: 1,
        }
    }

    /// Calculate the byte rate for 16-bit PCM (bytes per second)
    pub fn byte_rate_pcm16(&self) -> u32 {
        self.sample_rate.as_hz() * u32::from(self.channels) * 2
    }

    /// Duration in seconds of `frames` frames at this format
    pub fn duration_for_frames(&self, frames: usize) -> f64 {
        frames as f64 / f64::from(self.sample_rate.as_hz())
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::speech_mono()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_common_values() {
        assert_eq!(SampleRate::SPEECH.as_hz(), 16_000);
        assert_eq!(SampleRate::CD_QUALITY.as_hz(), 44_100);
        assert_eq!(SampleRate::DVD_QUALITY.as_hz(), 48_000);
    }

    #[test]
    fn default_is_speech_mono() {
        let format = StreamFormat::default();
        assert_eq!(format.sample_rate, SampleRate::SPEECH);
        assert_eq!(format.channels, 1);
    }

    #[test]
    fn byte_rate_pcm16() {
        // 16000 Hz * 1 channel * 2 bytes = 32,000 bytes/sec
        assert_eq!(StreamFormat::speech_mono().byte_rate_pcm16(), 32_000);
        // 44100 Hz * 2 channels * 2 bytes = 176,400 bytes/sec
        let stereo = StreamFormat::new(SampleRate::CD_QUALITY, 2);
        assert_eq!(stereo.byte_rate_pcm16(), 176_400);
    }

    #[test]
    fn frame_duration() {
        let format = StreamFormat::speech_mono();
        assert!((format.duration_for_frames(16_000) - 1.0).abs() < f64::EPSILON);
        assert!((format.duration_for_frames(8_000) - 0.5).abs() < f64::EPSILON);
    }
}
