//! Capability traits implemented by host platforms
//!
//! The playback engine never touches a platform API directly. A host
//! (desktop, test harness, embedded shell) implements these traits and
//! hands the bundle to the player through [`PlatformHost`].

use crate::buffer::BufferSnapshot;
use crate::error::Result;
use crate::types::{MediaSource, MediaType};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Discrete media playback primitive (the media-element equivalent)
///
/// One engine holds at most one element for its lifetime; the autoplay
/// probe creates short-lived throwaway ones. Dropping an element must
/// release its platform resources.
#[async_trait]
pub trait MediaElement: Send {
    /// Attach a source and load its metadata.
    ///
    /// Any previously attached source must be torn down first; an element
    /// never holds two sources at once.
    ///
    /// # Errors
    /// `MediaLoad` if the resource cannot be resolved or its metadata fails
    /// to load; `Unsupported` if the source kind is not available on this
    /// host.
    async fn load(&mut self, source: MediaSource) -> Result<()>;

    /// Start or resume output.
    ///
    /// # Errors
    /// `PolicyBlocked` if the platform refuses to start without a user
    /// gesture; `Unsupported` if the platform cannot report the attempt's
    /// outcome at all; `MediaLoad`/`Output` for resource failures.
    async fn start(&mut self) -> Result<()>;

    /// Suspend output, keeping the source and position
    fn pause(&mut self);

    /// Halt output and detach the current source
    fn stop(&mut self);

    /// Seek to a position in seconds from the start
    fn seek(&mut self, position_secs: f64);

    /// Set the volume (0.0 = silent, 1.0 = full volume)
    fn set_volume(&mut self, volume: f32);

    /// Get the current volume
    fn volume(&self) -> f32;

    /// Mute or unmute without touching the volume level
    fn set_muted(&mut self, muted: bool);

    /// Set the playback rate (1.0 = normal speed)
    fn set_rate(&mut self, rate: f64);

    /// Current position in seconds
    fn position(&self) -> f64;

    /// Total duration in seconds, if known
    fn duration(&self) -> Option<f64>;

    /// Whether the attached media played to its natural end
    fn is_ended(&self) -> bool;
}

impl std::fmt::Debug for dyn MediaElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn MediaElement")
    }
}

/// Real-time stream output primitive (the audio-context equivalent)
///
/// Drives at most one output node at a time. A node plays one pinned
/// [`BufferSnapshot`] from a start offset to the snapshot's end; growing
/// the stream means letting the node finish and starting a new node on the
/// next generation.
pub trait StreamOutput: Send {
    /// Make sure the underlying output context is running.
    ///
    /// Hosts with suspendable contexts resume them here; called before
    /// every stream start.
    ///
    /// # Errors
    /// `Unsupported` if no real-time output is available, `PolicyBlocked`
    /// if the context may not run without a user gesture, `Output` for
    /// other resume failures.
    fn ensure_running(&mut self) -> Result<()>;

    /// Start a node playing `snapshot` from `from_frame` at the given rate
    /// and volume, replacing any active node.
    ///
    /// # Errors
    /// `Output` if the node cannot be created or started.
    fn start_node(
        &mut self,
        snapshot: Arc<BufferSnapshot>,
        from_frame: usize,
        rate: f64,
        volume: f32,
    ) -> Result<()>;

    /// Stop and discard the active node, if any.
    ///
    /// A manual stop does not count as a natural finish.
    fn stop_node(&mut self);

    /// Whether a node exists and has not yet finished
    fn node_active(&self) -> bool;

    /// Poll-and-clear the natural-finish flag.
    ///
    /// Returns true exactly once after a node consumed its snapshot to the
    /// end.
    fn take_finished(&mut self) -> bool;

    /// Set the volume applied to the active and future nodes
    fn set_volume(&mut self, volume: f32);
}

/// Resolves when the next qualifying user gesture is observed.
///
/// One-shot: after resolving (or after the source goes away) the listener
/// is spent.
pub struct GestureListener {
    rx: oneshot::Receiver<()>,
}

impl GestureListener {
    /// Wait for the next gesture.
    ///
    /// Returns true when a gesture was observed, false if the gesture
    /// source was dropped first.
    pub async fn wait(self) -> bool {
        self.rx.await.is_ok()
    }
}

/// Source of user-gesture notifications (click/touch/key equivalents)
///
/// The detection mechanism is host-specific; the engine only needs to know
/// "a qualifying gesture happened".
pub trait UserGestureSource: Send + Sync {
    /// Register a one-shot listener for the next gesture
    fn listen(&self) -> GestureListener;

    /// Whether any gesture has been observed since the source was created
    fn gesture_seen(&self) -> bool;
}

/// Channel-backed [`UserGestureSource`] implementation.
///
/// Hosts wire their input layer (pointer/key events, remote control,
/// console input) to [`notify`](Self::notify); every registered listener
/// resolves on that call.
#[derive(Default)]
pub struct GestureNotifier {
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
    seen: AtomicBool,
}

impl GestureNotifier {
    /// Create a notifier with no observed gestures
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that a qualifying user gesture occurred.
    ///
    /// Resolves every currently registered listener; listeners registered
    /// afterwards wait for the next call.
    pub fn notify(&self) {
        self.seen.store(true, Ordering::SeqCst);
        let waiters = std::mem::take(&mut *self.waiters.lock().unwrap());
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

impl UserGestureSource for GestureNotifier {
    fn listen(&self) -> GestureListener {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().push(tx);
        GestureListener { rx }
    }

    fn gesture_seen(&self) -> bool {
        self.seen.load(Ordering::SeqCst)
    }
}

/// Capability bundle a host provides to the player
pub trait PlatformHost: Send + Sync {
    /// Create a fresh media element for the given media type.
    ///
    /// # Errors
    /// `Unsupported` if this host has no playback primitive for `media`.
    fn create_media_element(&self, media: MediaType) -> Result<Box<dyn MediaElement>>;

    /// Create a real-time stream output.
    ///
    /// # Errors
    /// `Unsupported` if this host has no real-time audio output.
    fn create_stream_output(&self) -> Result<Box<dyn StreamOutput>>;

    /// The host's user-gesture source, shared across players
    fn gesture_source(&self) -> Arc<dyn UserGestureSource>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifier_resolves_registered_listeners() {
        let notifier = GestureNotifier::new();
        let first = notifier.listen();
        let second = notifier.listen();
        assert!(!notifier.gesture_seen());

        notifier.notify();
        assert!(notifier.gesture_seen());
        assert!(first.wait().await);
        assert!(second.wait().await);
    }

    #[tokio::test]
    async fn listener_is_one_shot_per_registration() {
        let notifier = GestureNotifier::new();
        notifier.notify();

        // Registered after the gesture: waits for the next one
        let listener = notifier.listen();
        notifier.notify();
        assert!(listener.wait().await);
    }

    #[tokio::test]
    async fn dropped_source_reports_no_gesture() {
        let notifier = GestureNotifier::new();
        let listener = notifier.listen();
        drop(notifier);
        assert!(!listener.wait().await);
    }
}
