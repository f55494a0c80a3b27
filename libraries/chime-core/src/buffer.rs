//! Immutable stream buffer snapshots
//!
//! The streaming engine grows its buffer by copy: every consolidation
//! produces a new `BufferSnapshot` and swaps an `Arc` to it. An output node
//! holds its own clone of the `Arc` it was started with, so the generation
//! it is reading stays alive and untouched until the node finishes, no
//! matter how many newer generations exist.

use crate::types::StreamFormat;

/// One immutable generation of the stream buffer.
///
/// Samples are stored planar: one `Vec<f32>` per channel, all the same
/// length. A snapshot is never mutated after construction.
#[derive(Clone, PartialEq)]
pub struct BufferSnapshot {
    format: StreamFormat,
    channels: Vec<Vec<f32>>,
}

impl BufferSnapshot {
    /// Create a zero-length snapshot for the given format
    #[must_use]
    pub fn empty(format: StreamFormat) -> Self {
        Self {
            format,
            channels: vec![Vec::new(); format.channels as usize],
        }
    }

    /// Create a snapshot from planar channel data.
    ///
    /// # Panics
    /// If the channel count does not match the format, or the channels have
    /// unequal lengths. Both indicate a bug in the consolidation pass.
    #[must_use]
    pub fn from_channels(format: StreamFormat, channels: Vec<Vec<f32>>) -> Self {
        assert_eq!(
            channels.len(),
            format.channels as usize,
            "snapshot channel count must match format"
        );
        if let Some(first) = channels.first() {
            assert!(
                channels.iter().all(|c| c.len() == first.len()),
                "snapshot channels must have equal lengths"
            );
        }
        Self { format, channels }
    }

    /// Stream format of this snapshot
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Length in frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Whether the snapshot holds no samples
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Samples of one channel
    ///
    /// # Panics
    /// If `index` is out of range for the channel count.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Duration in seconds at the snapshot's sample rate
    pub fn duration_secs(&self) -> f64 {
        self.format.duration_for_frames(self.frames())
    }
}

// Manual Debug so a multi-second buffer prints its shape, not its samples
impl std::fmt::Debug for BufferSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSnapshot")
            .field("format", &self.format)
            .field("frames", &self.frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleRate;

    #[test]
    fn empty_snapshot() {
        let snap = BufferSnapshot::empty(StreamFormat::new(SampleRate::SPEECH, 2));
        assert_eq!(snap.channel_count(), 2);
        assert_eq!(snap.frames(), 0);
        assert!(snap.is_empty());
    }

    #[test]
    fn frames_and_duration() {
        let format = StreamFormat::speech_mono();
        let snap = BufferSnapshot::from_channels(format, vec![vec![0.0; 8_000]]);
        assert_eq!(snap.frames(), 8_000);
        assert!((snap.duration_secs() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    #[should_panic(expected = "channel count")]
    fn channel_count_mismatch_panics() {
        let format = StreamFormat::new(SampleRate::SPEECH, 2);
        let _ = BufferSnapshot::from_channels(format, vec![vec![0.0; 4]]);
    }

    #[test]
    #[should_panic(expected = "equal lengths")]
    fn unequal_channel_lengths_panic() {
        let format = StreamFormat::new(SampleRate::SPEECH, 2);
        let _ = BufferSnapshot::from_channels(format, vec![vec![0.0; 4], vec![0.0; 5]]);
    }

    #[test]
    fn debug_prints_shape() {
        let snap = BufferSnapshot::from_channels(StreamFormat::speech_mono(), vec![vec![0.0; 3]]);
        let debug = format!("{snap:?}");
        assert!(debug.contains("frames: 3"));
    }
}
