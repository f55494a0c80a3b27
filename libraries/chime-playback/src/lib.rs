//! Chime Player Playback Engine
//!
//! Platform-agnostic playback on top of the `chime-core` capability
//! traits: single-shot media playback, one-shot PCM blobs, real-time
//! chunk streaming, and autoplay policy handling, all behind one
//! [`AudioPlayer`] facade.
//!
//! # Architecture
//!
//! - **[`player`]**: the `AudioPlayer` facade and its deferred-play
//!   protocol for policy-blocked starts
//! - **[`broker`]**: the shared `PermissionBroker` that probes, caches,
//!   and broadcasts autoplay permission state across players
//! - **[`buffer`]**: the grow-only stream buffer (`BufferArena`) and the
//!   pending chunk queue feeding it
//! - **[`events`]**: typed event subscription (`EventHub`, `PlayerEvent`)
//! - **[`config`]**: tuning knobs (`PlayerConfig`)
//!
//! The engine state machine and the autoplay probe are internal; hosts
//! interact through the facade and the broker.
//!
//! # Example
//!
//! ```rust,no_run
//! use chime_playback::{AudioPlayer, PermissionBroker};
//! use chime_core::{MediaSource, PlatformHost};
//! use std::sync::Arc;
//!
//! async fn run(host: Arc<dyn PlatformHost>) -> chime_core::Result<()> {
//!     let broker = PermissionBroker::new(host.gesture_source());
//!     let player = AudioPlayer::new(host, broker);
//!
//!     // Resolves once audio is audibly or mutedly playing; a blocked
//!     // start waits for the next user gesture.
//!     player.play(MediaSource::Url("https://example.com/clip.mp3".into())).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod buffer;
pub mod config;
mod engine;
pub mod events;
pub mod player;
mod probe;

// Re-export the surface most hosts need
pub use broker::{ListenerId, PermissionBroker};
pub use config::PlayerConfig;
pub use events::{EventHub, EventKind, PlayerEvent, SubscriptionId};
pub use player::AudioPlayer;
