//! The `AudioPlayer` facade
//!
//! One facade per logical player. It owns the engine behind an async
//! mutex, the event hub, and the single-slot deferred play request, and
//! runs the autoplay negotiation the engine itself stays out of:
//!
//! 1. A policy-blocked start probes (or reuses) the broker's autoplay
//!    status and emits `AutoplayBlocked`.
//! 2. `AllowedMuted` retries muted; on success a one-shot gesture
//!    listener later ramps volume back up to the caller's target.
//! 3. Still blocked: the caller's future stays pending, the state is
//!    `WaitingForInteraction`, and a one-shot gesture listener retries
//!    the original operation.
//! 4. The retry resolves or rejects the pending future; a newer request
//!    rejects it with `Superseded`, `destroy()` with `Destroyed`.
//!
//! The engine lock is never held while waiting for a gesture, so chunk
//! appends and transport calls interleave freely with a blocked start.

use crate::broker::{ListenerId, PermissionBroker};
use crate::config::PlayerConfig;
use crate::engine::{Engine, StartOutcome, StatusCell};
use crate::events::{EventHub, EventKind, PlayerEvent, SubscriptionId};
use chime_core::types::{AutoplayStatus, MediaType, PermissionResult, StreamFormat};
use chime_core::{
    wav, MediaSource, PlatformHost, PlaybackState, PlayerError, Result, StreamChunk,
    UserGestureSource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

/// The resolver side of one deferred play request
struct PendingPlay {
    tx: oneshot::Sender<Result<()>>,
    session: u64,
}

/// Outcome of the blocked-start negotiation
enum Negotiation {
    /// Output is running (muted fallback succeeded)
    Started,
    /// Waiting for a user gesture; the receiver resolves with the retry
    Deferred(oneshot::Receiver<Result<()>>),
}

struct PlayerShared {
    host: Arc<dyn PlatformHost>,
    gestures: Arc<dyn UserGestureSource>,
    broker: Arc<PermissionBroker>,
    events: Arc<EventHub>,
    engine: tokio::sync::Mutex<Engine>,
    status: Arc<Mutex<StatusCell>>,
    pending: Mutex<Option<PendingPlay>>,
    destroyed: AtomicBool,
    config: PlayerConfig,
    broker_listener: ListenerId,
    ticker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Unified playback facade: file/URL playback, one-shot blobs, and
/// real-time chunk streaming behind one surface.
///
/// Cheap to clone; clones share the same player instance. Must be
/// created inside a Tokio runtime (it spawns its progress task).
#[derive(Clone)]
pub struct AudioPlayer {
    shared: Arc<PlayerShared>,
}

impl AudioPlayer {
    /// Create a player with default configuration
    pub fn new(host: Arc<dyn PlatformHost>, broker: Arc<PermissionBroker>) -> Self {
        Self::with_config(host, broker, PlayerConfig::default())
    }

    /// Create a player with explicit configuration
    pub fn with_config(
        host: Arc<dyn PlatformHost>,
        broker: Arc<PermissionBroker>,
        config: PlayerConfig,
    ) -> Self {
        let events = Arc::new(EventHub::new());
        let status = Arc::new(Mutex::new(StatusCell::default()));
        let engine = tokio::sync::Mutex::new(Engine::new(
            Arc::clone(&host),
            Arc::clone(&events),
            Arc::clone(&status),
        ));

        // Broker changes surface as this player's own events
        let events_clone = Arc::clone(&events);
        let broker_listener = broker.on_status_change(MediaType::Audio, move |result| {
            events_clone.emit(&PlayerEvent::AutoplayStatusChange {
                result: result.clone(),
            });
        });

        let shared = Arc::new(PlayerShared {
            gestures: host.gesture_source(),
            host,
            broker,
            events,
            engine,
            status,
            pending: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            config: config.clone(),
            broker_listener,
            ticker: Mutex::new(None),
        });

        let weak = Arc::downgrade(&shared);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.progress_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                if shared.destroyed.load(Ordering::SeqCst) {
                    break;
                }
                shared.engine.lock().await.tick();
            }
        });
        *shared.ticker.lock().unwrap() = Some(handle);

        Self { shared }
    }

    // ===== Playback =====

    /// Play a file, URL, or in-memory source.
    ///
    /// Resolves once output has actually started, audible or muted. If
    /// the platform blocks the start, the same future stays pending
    /// until a user gesture makes the retry succeed; it rejects on load
    /// failure, failed retry, supersession, or destroy.
    pub async fn play(&self, source: MediaSource) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        let outcome = engine.begin_play(source).await;
        self.shared.reject_stale_pending(engine.session());
        match outcome? {
            StartOutcome::Started => Ok(()),
            StartOutcome::Blocked(message) => {
                match self.negotiate_blocked(&mut engine, &message).await? {
                    Negotiation::Started => Ok(()),
                    Negotiation::Deferred(rx) => {
                        // Wait for the gesture retry with no lock held
                        drop(engine);
                        await_deferred(rx).await
                    }
                }
            }
        }
    }

    /// Play raw audio bytes. Self-describing blobs (WAV) pass through;
    /// anything else is treated as raw 16-bit PCM in the configured
    /// stream format and wrapped in a WAV container first.
    pub async fn play_blob(&self, bytes: Vec<u8>) -> Result<()> {
        let blob = if wav::is_wav(&bytes) {
            bytes
        } else {
            wav::wrap_pcm(&bytes, self.shared.config.stream_format)
        };
        self.play(MediaSource::Bytes(blob)).await
    }

    // ===== Streaming =====

    /// Open a chunk stream in the configured default format
    pub async fn start_stream(&self) -> Result<()> {
        self.start_stream_with(self.shared.config.stream_format).await
    }

    /// Open a chunk stream.
    ///
    /// Fails with `AlreadyStreaming` if a stream is active, leaving it
    /// untouched, and `Unsupported` if the host has no real-time output.
    /// Subject to the same autoplay negotiation as [`play`](Self::play).
    pub async fn start_stream_with(&self, format: StreamFormat) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        let outcome = engine.begin_stream(format).await;
        self.shared.reject_stale_pending(engine.session());
        match outcome? {
            StartOutcome::Started => Ok(()),
            StartOutcome::Blocked(message) => {
                match self.negotiate_blocked(&mut engine, &message).await? {
                    Negotiation::Started => Ok(()),
                    Negotiation::Deferred(rx) => {
                        drop(engine);
                        await_deferred(rx).await
                    }
                }
            }
        }
    }

    /// Append one chunk of samples to the active stream.
    ///
    /// Accepts `Vec<f32>`, `Vec<i16>`, or little-endian 16-bit PCM bytes
    /// via the [`StreamChunk`] conversions. The chunk is normalized,
    /// consolidated into the buffer, and an output node is started if
    /// none is running.
    pub async fn append_stream_data(&self, chunk: impl Into<StreamChunk>) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        engine.append(chunk.into())
    }

    /// Close the stream to new appends and let buffered data drain.
    ///
    /// `Ended` fires when the drain finishes (immediately if nothing is
    /// buffered). No-op without an active stream.
    pub async fn stop_stream(&self) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        engine.stop_stream();
        Ok(())
    }

    // ===== Transport =====

    /// Suspend output, keeping position and resources
    pub async fn pause(&self) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        engine.pause();
        Ok(())
    }

    /// Resume paused output. May re-enter the autoplay negotiation.
    pub async fn resume(&self) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        match engine.resume().await? {
            StartOutcome::Started => Ok(()),
            StartOutcome::Blocked(message) => {
                match self.negotiate_blocked(&mut engine, &message).await? {
                    Negotiation::Started => Ok(()),
                    Negotiation::Deferred(rx) => {
                        drop(engine);
                        await_deferred(rx).await
                    }
                }
            }
        }
    }

    /// Halt playback, drop buffers, and reset to `Idle`. Idempotent.
    /// An outstanding deferred play request is rejected.
    pub async fn stop(&self) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        engine.stop();
        self.shared.reject_stale_pending(engine.session());
        Ok(())
    }

    /// Seek to a position in seconds
    pub async fn seek(&self, position_secs: f64) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        engine.seek(position_secs);
        Ok(())
    }

    /// Set the volume; out-of-range values clamp into [0.0, 1.0]
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        engine.set_volume(volume);
        Ok(())
    }

    /// Set the playback rate; out-of-range values clamp into [0.5, 4.0]
    pub async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        engine.set_playback_rate(rate);
        Ok(())
    }

    // ===== Synchronous views =====

    /// Current playback state
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.shared.status.lock().unwrap().state
    }

    /// Current position in seconds
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.shared.status.lock().unwrap().position
    }

    /// Total duration in seconds, if known
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.shared.status.lock().unwrap().duration
    }

    // ===== Events =====

    /// Subscribe to one event kind.
    ///
    /// Handlers run on whichever task triggered the event and must not
    /// block. A panicking handler is logged and skipped; playback and the
    /// other handlers are unaffected.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&PlayerEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.shared.events.subscribe(kind, handler)
    }

    /// Unsubscribe by token. Returns true if the token was registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    // ===== Autoplay =====

    /// Resolve the autoplay status, cache-first unless `force_check`
    pub async fn detect_autoplay_support(&self, force_check: bool) -> Result<PermissionResult> {
        self.ensure_alive()?;
        Ok(self
            .shared
            .broker
            .detect(self.shared.host.as_ref(), MediaType::Audio, force_check)
            .await)
    }

    /// Force a fresh autoplay probe. With `muted` the probe checks the
    /// muted tier only.
    pub async fn request_autoplay_permission(&self, muted: bool) -> Result<PermissionResult> {
        self.ensure_alive()?;
        Ok(self
            .shared
            .broker
            .request_permission(self.shared.host.as_ref(), MediaType::Audio, muted)
            .await)
    }

    /// Manually retry a start that is waiting for user interaction.
    ///
    /// For hosts that know a gesture just happened outside the gesture
    /// source's view. No-op unless the player is in
    /// `WaitingForInteraction`; returns `PolicyBlocked` if the platform
    /// still refuses.
    pub async fn resume_after_interaction(&self) -> Result<()> {
        self.ensure_alive()?;
        let mut engine = self.shared.engine.lock().await;
        if engine.state() != PlaybackState::WaitingForInteraction {
            return Ok(());
        }
        let session = engine.session();
        match engine.retry_after_gesture().await {
            Ok(StartOutcome::Started) => {
                self.shared.resolve_pending(session, Ok(()));
                Ok(())
            }
            Ok(StartOutcome::Blocked(message)) => Err(PlayerError::policy_blocked(message)),
            Err(err) => {
                self.shared.resolve_pending(session, Err(err.clone()));
                Err(err)
            }
        }
    }

    // ===== Lifecycle =====

    /// Destroy the player: halt output, reject any deferred play request
    /// with `Destroyed`, and stop the progress task. Every later call
    /// fails with `Destroyed`. Idempotent.
    pub async fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Player destroyed");
        // Reject first so no caller is left hanging on the engine lock
        self.shared.take_pending(None, PlayerError::Destroyed);
        {
            let mut engine = self.shared.engine.lock().await;
            engine.stop();
        }
        self.shared.broker.off_status_change(self.shared.broker_listener);
        if let Some(handle) = self.shared.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Err(PlayerError::Destroyed);
        }
        Ok(())
    }

    // ===== Blocked-start negotiation =====

    /// Run the blocked-start negotiation under the engine lock.
    ///
    /// Never waits for a gesture itself; a deferred outcome hands the
    /// receiver back so the caller can drop the lock first.
    async fn negotiate_blocked(&self, engine: &mut Engine, message: &str) -> Result<Negotiation> {
        debug!("Start blocked by autoplay policy: {}", message);
        let result = self
            .shared
            .broker
            .detect(self.shared.host.as_ref(), MediaType::Audio, false)
            .await;
        self.shared.events.emit(&PlayerEvent::AutoplayBlocked {
            result: result.clone(),
        });

        if result.status == AutoplayStatus::AllowedMuted {
            match engine.start_muted().await? {
                StartOutcome::Started => {
                    self.arm_unmute_ramp(engine.session());
                    return Ok(Negotiation::Started);
                }
                StartOutcome::Blocked(_) => {}
            }
        }

        engine.enter_waiting();
        let session = engine.session();
        let (tx, rx) = oneshot::channel();
        self.shared.install_pending(PendingPlay { tx, session });
        self.arm_gesture_retry(session);
        Ok(Negotiation::Deferred(rx))
    }

    /// Register a one-shot gesture listener that retries the blocked
    /// operation for `session`
    fn arm_gesture_retry(&self, session: u64) {
        let listener = self.shared.gestures.listen();
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            if !listener.wait().await {
                return;
            }
            let Some(shared) = weak.upgrade() else { return };
            AudioPlayer { shared }.run_retry(session).await;
        });
    }

    async fn run_retry(&self, session: u64) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let mut engine = self.shared.engine.lock().await;
        if engine.session() != session {
            // A newer operation or a stop took over; whoever bumped the
            // session resolved the pending request
            return;
        }
        debug!("User gesture observed; retrying blocked start");
        match engine.retry_after_gesture().await {
            Ok(StartOutcome::Started) => self.shared.resolve_pending(session, Ok(())),
            Ok(StartOutcome::Blocked(message)) => {
                // The gesture did not satisfy the platform. Keep the
                // request pending and wait for the next one.
                debug!("Retry still blocked: {}", message);
                self.arm_gesture_retry(session);
            }
            Err(err) => self.shared.resolve_pending(session, Err(err)),
        }
    }

    /// Register a one-shot gesture listener that ramps volume from the
    /// muted fallback back up to the caller's target
    fn arm_unmute_ramp(&self, session: u64) {
        let listener = self.shared.gestures.listen();
        let weak = Arc::downgrade(&self.shared);
        let steps = self.shared.config.ramp_steps;
        let step_interval = self.shared.config.ramp_step_interval;
        tokio::spawn(async move {
            if !listener.wait().await {
                return;
            }
            let Some(shared) = weak.upgrade() else { return };
            {
                let mut engine = shared.engine.lock().await;
                if engine.session() != session {
                    return;
                }
                debug!("User gesture observed; ramping volume up");
                engine.begin_unmute();
            }
            for step in 1..=steps {
                tokio::time::sleep(step_interval).await;
                let mut engine = shared.engine.lock().await;
                if engine.session() != session {
                    return;
                }
                engine.ramp_step(step, steps);
            }
        });
    }
}

impl PlayerShared {
    /// Install a new deferred request; an unexpectedly present old one
    /// is rejected as superseded
    fn install_pending(&self, pending: PendingPlay) {
        if let Some(old) = self.pending.lock().unwrap().replace(pending) {
            let _ = old.tx.send(Err(PlayerError::Superseded));
        }
    }

    /// Reject a pending request whose session the engine has moved past
    fn reject_stale_pending(&self, current_session: u64) {
        let stale = {
            let mut slot = self.pending.lock().unwrap();
            match slot.take() {
                Some(pending) if pending.session < current_session => Some(pending),
                Some(pending) => {
                    *slot = Some(pending);
                    None
                }
                None => None,
            }
        };
        if let Some(pending) = stale {
            debug!("Deferred play request superseded");
            let _ = pending.tx.send(Err(PlayerError::Superseded));
        }
    }

    /// Resolve the pending request for `session` with `result`
    fn resolve_pending(&self, session: u64, result: Result<()>) {
        if let Some(pending) = self.take_pending(Some(session), PlayerError::Superseded) {
            let _ = pending.tx.send(result);
        }
    }

    /// Take the pending request out of the slot.
    ///
    /// With a session filter, a non-matching request is left in place
    /// and `None` returned. Without one, any request is taken and
    /// rejected with `reject_with` directly.
    fn take_pending(
        &self,
        session: Option<u64>,
        reject_with: PlayerError,
    ) -> Option<PendingPlay> {
        let mut slot = self.pending.lock().unwrap();
        match (slot.take(), session) {
            (Some(pending), Some(expected)) if pending.session == expected => Some(pending),
            (Some(pending), Some(_)) => {
                *slot = Some(pending);
                None
            }
            (Some(pending), None) => {
                let _ = pending.tx.send(Err(reject_with));
                None
            }
            (None, _) => None,
        }
    }
}

async fn await_deferred(rx: oneshot::Receiver<Result<()>>) -> Result<()> {
    match rx.await {
        Ok(result) => result,
        // Resolver dropped without sending: the player went away
        Err(_) => Err(PlayerError::Destroyed),
    }
}

impl Drop for PlayerShared {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for AudioPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = *self.shared.status.lock().unwrap();
        f.debug_struct("AudioPlayer")
            .field("state", &cell.state)
            .field("position", &cell.position)
            .field("destroyed", &self.shared.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::{GestureNotifier, MediaElement, StreamOutput};

    struct NullHost {
        gestures: Arc<GestureNotifier>,
    }

    impl NullHost {
        fn new() -> Self {
            Self {
                gestures: Arc::new(GestureNotifier::new()),
            }
        }
    }

    impl PlatformHost for NullHost {
        fn create_media_element(&self, _media: MediaType) -> Result<Box<dyn MediaElement>> {
            Err(PlayerError::unsupported("no media element"))
        }
        fn create_stream_output(&self) -> Result<Box<dyn StreamOutput>> {
            Err(PlayerError::unsupported("no stream output"))
        }
        fn gesture_source(&self) -> Arc<dyn UserGestureSource> {
            Arc::clone(&self.gestures) as Arc<dyn UserGestureSource>
        }
    }

    fn null_player() -> AudioPlayer {
        let host: Arc<dyn PlatformHost> = Arc::new(NullHost::new());
        let broker = PermissionBroker::new(host.gesture_source());
        AudioPlayer::new(host, broker)
    }

    #[tokio::test]
    async fn fresh_player_defaults() {
        let player = null_player();
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(player.duration(), None);
    }

    #[tokio::test]
    async fn destroyed_player_rejects_operations() {
        let player = null_player();
        player.destroy().await;

        let err = player.play(MediaSource::Url("x".into())).await.unwrap_err();
        assert!(matches!(err, PlayerError::Destroyed));
        let err = player.start_stream().await.unwrap_err();
        assert!(matches!(err, PlayerError::Destroyed));
        let err = player.append_stream_data(vec![0i16]).await.unwrap_err();
        assert!(matches!(err, PlayerError::Destroyed));
        let err = player.pause().await.unwrap_err();
        assert!(matches!(err, PlayerError::Destroyed));

        // Destroy again is a no-op
        player.destroy().await;
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn clones_share_one_instance() {
        let player = null_player();
        let clone = player.clone();
        clone.destroy().await;
        let err = player.stop().await.unwrap_err();
        assert!(matches!(err, PlayerError::Destroyed));
    }

    #[tokio::test]
    async fn capability_errors_pass_through() {
        let player = null_player();
        let err = player.start_stream().await.unwrap_err();
        assert!(matches!(err, PlayerError::Unsupported(_)));
        // Soft failure: the player is still usable
        assert_eq!(player.state(), PlaybackState::Idle);
        let err = player.play(MediaSource::Url("x".into())).await.unwrap_err();
        assert!(matches!(err, PlayerError::Unsupported(_)));
    }
}
