//! Vocabulary types shared across the playback crates

mod format;
mod permission;
mod source;
mod state;

pub use format::{SampleRate, StreamFormat};
pub use permission::{AutoplayStatus, MediaType, PermissionResult};
pub use source::MediaSource;
pub use state::PlaybackState;
