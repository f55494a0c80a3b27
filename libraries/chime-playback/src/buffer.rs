//! Stream buffer accumulation
//!
//! Incoming chunks land in a [`PendingChunkQueue`] and are merged into the
//! playable buffer by a consolidation pass ("flush"). The buffer itself is
//! copy-on-grow: a flush allocates a new [`BufferSnapshot`] of the combined
//! length, copies old content at offset 0 and the queued content behind it,
//! and swaps the arena's `Arc` only once the new snapshot is complete. An
//! output node reading the previous generation is never disturbed; its
//! `Arc` clone keeps that generation alive until the node finishes.

use chime_core::{BufferSnapshot, StreamFormat};
use std::sync::Arc;

/// Ordered chunks awaiting consolidation.
///
/// A flush drains the entire queue in one step; there is no partial drain.
#[derive(Debug, Default)]
pub struct PendingChunkQueue {
    chunks: Vec<Vec<f32>>,
    total_samples: usize,
}

impl PendingChunkQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append normalized samples in arrival order
    pub fn push(&mut self, samples: Vec<f32>) {
        self.total_samples += samples.len();
        self.chunks.push(samples);
    }

    /// Take every queued chunk, leaving the queue empty
    pub fn drain_all(&mut self) -> Vec<Vec<f32>> {
        self.total_samples = 0;
        std::mem::take(&mut self.chunks)
    }

    /// Total queued samples across all chunks
    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Whether no chunks are queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of queued chunks
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Remove all queued chunks
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_samples = 0;
    }
}

/// Owner of the growing stream buffer and its read position.
///
/// Chunks are interpreted as mono frames and replicated across every
/// channel of a multi-channel buffer during consolidation.
pub struct BufferArena {
    format: StreamFormat,
    current: Arc<BufferSnapshot>,
    generation: u64,
    read_position: usize,
    total_appended: usize,
}

impl BufferArena {
    /// Create an arena holding a zero-length generation
    #[must_use]
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            current: Arc::new(BufferSnapshot::empty(format)),
            generation: 0,
            read_position: 0,
            total_appended: 0,
        }
    }

    /// Merge every queued chunk into a new generation.
    ///
    /// Returns true if the buffer grew. The previous generation is left
    /// untouched; only the arena's reference moves.
    pub fn consolidate(&mut self, queue: &mut PendingChunkQueue) -> bool {
        if queue.is_empty() {
            return false;
        }
        let chunks = queue.drain_all();
        let added: usize = chunks.iter().map(Vec::len).sum();
        if added == 0 {
            return false;
        }

        let old = &self.current;
        let old_frames = old.frames();
        let channel_count = self.format.channels as usize;

        let mut channels = Vec::with_capacity(channel_count);
        for index in 0..channel_count {
            let mut data = Vec::with_capacity(old_frames + added);
            data.extend_from_slice(old.channel(index));
            for chunk in &chunks {
                data.extend_from_slice(chunk);
            }
            channels.push(data);
        }

        self.current = Arc::new(BufferSnapshot::from_channels(self.format, channels));
        self.generation += 1;
        self.total_appended += added;
        true
    }

    /// The current generation, shared with output nodes
    #[must_use]
    pub fn snapshot(&self) -> Arc<BufferSnapshot> {
        Arc::clone(&self.current)
    }

    /// Length of the current generation in frames
    #[must_use]
    pub fn frames(&self) -> usize {
        self.current.frames()
    }

    /// Frames consumed so far
    #[must_use]
    pub fn read_position(&self) -> usize {
        self.read_position
    }

    /// Advance or rewind the read position, clamped to the buffer length
    pub fn set_read_position(&mut self, frames: usize) {
        self.read_position = frames.min(self.frames());
    }

    /// Frames available beyond the read position
    #[must_use]
    pub fn unread_frames(&self) -> usize {
        self.frames() - self.read_position
    }

    /// Monotonic count of every frame ever consolidated
    #[must_use]
    pub fn total_appended(&self) -> usize {
        self.total_appended
    }

    /// Generation counter, bumped once per consolidation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stream format of the buffer
    #[must_use]
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Seconds of audio buffered from the start
    #[must_use]
    pub fn buffered_secs(&self) -> f64 {
        self.format.duration_for_frames(self.frames())
    }
}

impl std::fmt::Debug for BufferArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferArena")
            .field("format", &self.format)
            .field("generation", &self.generation)
            .field("frames", &self.frames())
            .field("read_position", &self.read_position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::types::SampleRate;

    fn mono_arena() -> BufferArena {
        BufferArena::new(StreamFormat::speech_mono())
    }

    #[test]
    fn queue_drains_fully() {
        let mut queue = PendingChunkQueue::new();
        queue.push(vec![0.1, 0.2]);
        queue.push(vec![0.3]);
        assert_eq!(queue.total_samples(), 3);
        assert_eq!(queue.len(), 2);

        let drained = queue.drain_all();
        assert_eq!(drained, vec![vec![0.1, 0.2], vec![0.3]]);
        assert!(queue.is_empty());
        assert_eq!(queue.total_samples(), 0);
    }

    #[test]
    fn consolidation_grows_buffer() {
        let mut arena = mono_arena();
        let mut queue = PendingChunkQueue::new();
        assert_eq!(arena.frames(), 0);

        queue.push(vec![0.1, 0.2, 0.3]);
        assert!(arena.consolidate(&mut queue));
        assert_eq!(arena.frames(), 3);
        assert_eq!(arena.generation(), 1);
        assert_eq!(arena.snapshot().channel(0), &[0.1, 0.2, 0.3]);

        queue.push(vec![0.4]);
        queue.push(vec![0.5, 0.6]);
        assert!(arena.consolidate(&mut queue));
        assert_eq!(arena.frames(), 6);
        assert_eq!(arena.generation(), 2);
        // Arrival order preserved across chunks
        assert_eq!(arena.snapshot().channel(0), &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn empty_queue_consolidation_is_noop() {
        let mut arena = mono_arena();
        let mut queue = PendingChunkQueue::new();
        assert!(!arena.consolidate(&mut queue));
        assert_eq!(arena.generation(), 0);
    }

    #[test]
    fn old_generation_survives_growth() {
        let mut arena = mono_arena();
        let mut queue = PendingChunkQueue::new();

        queue.push(vec![0.1, 0.2]);
        arena.consolidate(&mut queue);
        let pinned = arena.snapshot();

        queue.push(vec![0.3]);
        arena.consolidate(&mut queue);

        // The node's pinned generation is unchanged
        assert_eq!(pinned.frames(), 2);
        assert_eq!(pinned.channel(0), &[0.1, 0.2]);
        // The arena moved on
        assert_eq!(arena.frames(), 3);
    }

    #[test]
    fn mono_chunks_replicate_to_all_channels() {
        let format = StreamFormat::new(SampleRate::SPEECH, 2);
        let mut arena = BufferArena::new(format);
        let mut queue = PendingChunkQueue::new();

        queue.push(vec![0.5, -0.5]);
        arena.consolidate(&mut queue);

        let snap = arena.snapshot();
        assert_eq!(snap.channel_count(), 2);
        assert_eq!(snap.channel(0), &[0.5, -0.5]);
        assert_eq!(snap.channel(1), &[0.5, -0.5]);
    }

    #[test]
    fn read_position_clamps_to_length() {
        let mut arena = mono_arena();
        let mut queue = PendingChunkQueue::new();
        queue.push(vec![0.0; 10]);
        arena.consolidate(&mut queue);

        arena.set_read_position(4);
        assert_eq!(arena.read_position(), 4);
        assert_eq!(arena.unread_frames(), 6);

        arena.set_read_position(100);
        assert_eq!(arena.read_position(), 10);
        assert_eq!(arena.unread_frames(), 0);
    }

    #[test]
    fn total_appended_is_monotonic() {
        let mut arena = mono_arena();
        let mut queue = PendingChunkQueue::new();

        let mut expected = 0;
        for size in [3usize, 1, 7, 2] {
            queue.push(vec![0.0; size]);
            arena.consolidate(&mut queue);
            expected += size;
            assert_eq!(arena.total_appended(), expected);
            assert_eq!(arena.frames(), expected);
        }
    }

    #[test]
    fn buffered_seconds() {
        let mut arena = mono_arena();
        let mut queue = PendingChunkQueue::new();
        queue.push(vec![0.0; 8_000]);
        arena.consolidate(&mut queue);
        assert!((arena.buffered_secs() - 0.5).abs() < f64::EPSILON);
    }
}
