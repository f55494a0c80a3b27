//! Chime Player Core
//!
//! Platform-agnostic types, capability traits, and error handling for the
//! Chime playback engine.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Vocabulary Types**: `PlaybackState`, `AutoplayStatus`,
//!   `PermissionResult`, `MediaSource`, `StreamFormat`
//! - **Capability Traits**: `MediaElement`, `StreamOutput`,
//!   `UserGestureSource`, `PlatformHost`, the seams a host environment
//!   implements so the engine stays platform-agnostic
//! - **PCM Helpers**: chunk normalization (`StreamChunk`) and the minimal
//!   WAV container writer used for raw-PCM playback and the autoplay probe
//! - **Error Handling**: unified `PlayerError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use chime_core::{MediaSource, PlaybackState, StreamChunk, StreamFormat};
//!
//! // A stream format for 16 kHz mono speech audio
//! let format = StreamFormat::default();
//! assert_eq!(format.sample_rate.as_hz(), 16_000);
//!
//! // Chunk inputs convert from plain vectors
//! let chunk: StreamChunk = vec![0i16, 16384].into();
//! let samples = chunk.into_samples().unwrap();
//! assert_eq!(samples, vec![0.0, 0.5]);
//!
//! // Sources name where audio comes from
//! let source = MediaSource::Url("https://example.com/clip.mp3".into());
//! assert!(!source.is_bytes());
//! let _ = PlaybackState::Idle;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod chunk;
pub mod error;
pub mod traits;
pub mod types;
pub mod wav;

// Re-export commonly used types
pub use buffer::BufferSnapshot;
pub use chunk::StreamChunk;
pub use error::{PlayerError, Result};
pub use traits::{
    GestureListener, GestureNotifier, MediaElement, PlatformHost, StreamOutput, UserGestureSource,
};
pub use types::{
    AutoplayStatus, MediaSource, MediaType, PermissionResult, PlaybackState, SampleRate,
    StreamFormat,
};
