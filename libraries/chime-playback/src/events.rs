//! Player events and the typed subscription hub
//!
//! Events are emitted at key points:
//! - Transport changes (play/pause/stop/ended)
//! - Periodic time updates while output runs
//! - Buffering progress for streams and loaded media
//! - Autoplay policy outcomes (blocked, status changed)
//!
//! Subscriptions are keyed by [`EventKind`] and return a
//! [`SubscriptionId`] token; multiple subscribers per kind are supported
//! and each is removed by its own token.

use chime_core::PermissionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Events emitted by a player instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// Output started or resumed
    Play,

    /// Output paused
    Pause,

    /// Playback was stopped and the player reset
    Stop,

    /// Media or stream finished naturally
    Ended,

    /// An error occurred
    Error {
        /// Error message
        message: String,
    },

    /// Periodic position update (emitted only when the position changed)
    TimeUpdate {
        /// Current position in seconds
        position: f64,
        /// Total duration in seconds, if known
        duration: Option<f64>,
    },

    /// Buffered data grew (stream consolidation or media load)
    Progress {
        /// Seconds of audio available from the start
        buffered: f64,
        /// Total duration in seconds, if known
        duration: Option<f64>,
    },

    /// Volume changed
    VolumeChange {
        /// New volume (0.0 to 1.0)
        volume: f32,
    },

    /// A start attempt was rejected by the platform autoplay policy
    AutoplayBlocked {
        /// The probed permission state at the time of the rejection
        result: PermissionResult,
    },

    /// The cached autoplay permission state changed
    AutoplayStatusChange {
        /// The new permission state
        result: PermissionResult,
    },
}

impl PlayerEvent {
    /// The subscription key this event is delivered under
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Play => EventKind::Play,
            Self::Pause => EventKind::Pause,
            Self::Stop => EventKind::Stop,
            Self::Ended => EventKind::Ended,
            Self::Error { .. } => EventKind::Error,
            Self::TimeUpdate { .. } => EventKind::TimeUpdate,
            Self::Progress { .. } => EventKind::Progress,
            Self::VolumeChange { .. } => EventKind::VolumeChange,
            Self::AutoplayBlocked { .. } => EventKind::AutoplayBlocked,
            Self::AutoplayStatusChange { .. } => EventKind::AutoplayStatusChange,
        }
    }
}

/// Subscription key for one category of [`PlayerEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Output started or resumed
    Play,
    /// Output paused
    Pause,
    /// Player stopped and reset
    Stop,
    /// Natural end of media or stream
    Ended,
    /// Errors
    Error,
    /// Periodic position updates
    TimeUpdate,
    /// Buffered-data growth
    Progress,
    /// Volume changes
    VolumeChange,
    /// Autoplay rejections
    AutoplayBlocked,
    /// Autoplay permission state changes
    AutoplayStatusChange,
}

impl EventKind {
    /// Convert to string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Ended => "ended",
            Self::Error => "error",
            Self::TimeUpdate => "time_update",
            Self::Progress => "progress",
            Self::VolumeChange => "volume_change",
            Self::AutoplayBlocked => "autoplay_blocked",
            Self::AutoplayStatusChange => "autoplay_status_change",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token returned by [`EventHub::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    subscribers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
    next_id: u64,
}

/// Multi-subscriber event dispatcher keyed by [`EventKind`]
#[derive(Default)]
pub struct EventHub {
    inner: Mutex<HubInner>,
}

impl EventHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&PlayerEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .subscribers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler by its token.
    ///
    /// Returns true if the token was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        for handlers in inner.subscribers.values_mut() {
            if let Some(index) = handlers.iter().position(|(hid, _)| *hid == id) {
                handlers.remove(index);
                return true;
            }
        }
        false
    }

    /// Deliver an event to every subscriber of its kind.
    ///
    /// Handlers run outside the hub lock, so they may subscribe or
    /// unsubscribe reentrantly. A panicking handler is logged and skipped;
    /// the panic reaches neither the emitter nor the other handlers.
    pub fn emit(&self, event: &PlayerEvent) {
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock().unwrap();
            inner
                .subscribers
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!("Event handler panicked for {}", event.kind());
            }
        }
    }

    /// Number of subscribers for one kind
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}
