//! Chime Player Desktop Host
//!
//! CPAL-backed implementation of the `chime-core` capability traits for
//! desktop platforms.
//!
//! # Architecture
//!
//! - **[`SymphoniaMediaElement`]**: single-shot media playback; `load`
//!   decodes the whole source through Symphonia (resampling with Rubato
//!   when the device rate differs) and transport controls run on shared
//!   state
//! - **[`CpalStreamOutput`]**: the real-time output node driving pinned
//!   stream-buffer snapshots for PCM chunk playback
//! - **[`DesktopHost`]**: the capability bundle handed to players, plus
//!   the gesture feed applications wire their input layer to
//!
//! Desktop audio needs no user gesture, so players on this host never
//! see an autoplay block.
//!
//! # Example
//!
//! ```rust,no_run
//! use chime_audio_desktop::DesktopHost;
//! use chime_core::{MediaSource, PlatformHost};
//! use chime_playback::{AudioPlayer, PermissionBroker};
//!
//! # async fn run() -> chime_core::Result<()> {
//! let host = DesktopHost::new();
//! let broker = PermissionBroker::new(host.gesture_source());
//! let player = AudioPlayer::new(host, broker);
//!
//! player.play(MediaSource::File("clip.flac".into())).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod element;
mod error;
mod host;
mod output;

pub use element::SymphoniaMediaElement;
pub use error::{AudioError, Result};
pub use host::DesktopHost;
pub use output::CpalStreamOutput;
