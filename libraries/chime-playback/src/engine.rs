//! Playback engine state machine
//!
//! One engine per player instance. The engine owns the platform
//! primitives for the active mode (a media element for single-shot
//! playback, a stream output plus buffer arena for streams), runs every
//! state transition, and emits the corresponding events. It lives behind
//! the facade's async mutex, so no two transitions are ever in flight at
//! once.
//!
//! The engine reports policy rejections as [`StartOutcome::Blocked`]
//! instead of acting on them; the facade owns the autoplay negotiation
//! (muted fallback, deferred retry).

use crate::buffer::{BufferArena, PendingChunkQueue};
use crate::events::{EventHub, PlayerEvent};
use chime_core::types::{MediaType, StreamFormat};
use chime_core::{
    BufferSnapshot, MediaElement, MediaSource, PlatformHost, PlaybackState, PlayerError, Result,
    StreamChunk, StreamOutput,
};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Result of a start attempt that may be rejected by autoplay policy
#[derive(Debug)]
pub(crate) enum StartOutcome {
    /// Output is running (audible or muted)
    Started,
    /// The platform refused to start without a user gesture
    Blocked(String),
}

/// Snapshot of the externally visible player state.
///
/// Shared between the engine (writer) and the facade's synchronous
/// getters (readers) behind a plain mutex.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StatusCell {
    pub(crate) state: PlaybackState,
    pub(crate) position: f64,
    pub(crate) duration: Option<f64>,
}

struct ElementMode {
    element: Box<dyn MediaElement>,
}

/// Bookkeeping for one output-node run over one pinned snapshot
struct NodeRun {
    epoch: tokio::time::Instant,
    start_frame: usize,
    end_frame: usize,
    rate: f64,
}

impl NodeRun {
    fn current_frame(&self, hz: f64) -> usize {
        let elapsed = self.epoch.elapsed().as_secs_f64();
        let advanced = (elapsed * self.rate * hz) as usize;
        (self.start_frame + advanced).min(self.end_frame)
    }

    fn position_secs(&self, hz: f64) -> f64 {
        self.current_frame(hz) as f64 / hz
    }
}

struct StreamMode {
    output: Box<dyn StreamOutput>,
    arena: BufferArena,
    queue: PendingChunkQueue,
    /// False once `stop_stream` closed the stream to new appends
    open: bool,
    node: Option<NodeRun>,
}

enum Mode {
    Inactive,
    Element(ElementMode),
    Stream(StreamMode),
}

pub(crate) struct Engine {
    host: Arc<dyn PlatformHost>,
    events: Arc<EventHub>,
    status: Arc<Mutex<StatusCell>>,
    mode: Mode,
    session: u64,
    /// Caller-set target volume, applied directly unless muted
    volume: f32,
    /// True while the muted autoplay fallback is active
    muted: bool,
    rate: f64,
}

impl Engine {
    pub(crate) fn new(
        host: Arc<dyn PlatformHost>,
        events: Arc<EventHub>,
        status: Arc<Mutex<StatusCell>>,
    ) -> Self {
        Self {
            host,
            events,
            status,
            mode: Mode::Inactive,
            session: 0,
            volume: 1.0,
            muted: false,
            rate: 1.0,
        }
    }

    /// Session number, bumped on every stop and every new start.
    ///
    /// Background tasks capture it at spawn and bail out when a later
    /// lock shows a different value.
    pub(crate) fn session(&self) -> u64 {
        self.session
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.status.lock().unwrap().state
    }

    pub(crate) fn current_volume(&self) -> f32 {
        self.volume
    }

    pub(crate) fn playback_rate(&self) -> f64 {
        self.rate
    }

    // ===== Single-shot playback =====

    /// Load a source into a fresh media element and attempt to start it.
    ///
    /// Any previous playback (single-shot or stream) is torn down first.
    /// A policy rejection keeps the loaded element attached and returns
    /// `Blocked`; the facade decides the fallback.
    pub(crate) async fn begin_play(&mut self, source: MediaSource) -> Result<StartOutcome> {
        let mut element = match self.host.create_media_element(MediaType::Audio) {
            Ok(element) => element,
            Err(err) => {
                self.fail_soft(&err);
                return Err(err);
            }
        };

        self.session += 1;
        self.reset_to_idle();
        self.set_state(PlaybackState::Loading);
        self.muted = false;
        debug!("Loading {}", source.describe());

        element.set_volume(self.volume);
        element.set_rate(self.rate);
        if let Err(err) = element.load(source).await {
            self.fail_hard(&err);
            return Err(err);
        }

        let duration = element.duration();
        {
            let mut cell = self.status.lock().unwrap();
            cell.position = 0.0;
            cell.duration = duration;
        }
        if let Some(duration) = duration {
            self.events.emit(&PlayerEvent::Progress {
                buffered: duration,
                duration: Some(duration),
            });
        }

        match element.start().await {
            Ok(()) => {
                self.mode = Mode::Element(ElementMode { element });
                self.set_state(PlaybackState::Playing);
                Ok(StartOutcome::Started)
            }
            Err(PlayerError::PolicyBlocked(message)) => {
                // Keep the loaded element for the fallback attempts
                self.mode = Mode::Element(ElementMode { element });
                Ok(StartOutcome::Blocked(message))
            }
            Err(err) => {
                self.fail_hard(&err);
                Err(err)
            }
        }
    }

    /// Retry the blocked start muted (element) or at volume zero (stream)
    pub(crate) async fn start_muted(&mut self) -> Result<StartOutcome> {
        match &mut self.mode {
            Mode::Element(em) => {
                em.element.set_muted(true);
                em.element.set_volume(0.0);
                let attempt = em.element.start().await;
                match attempt {
                    Ok(()) => {
                        self.muted = true;
                        self.set_state(PlaybackState::Playing);
                        debug!("Muted fallback playback started");
                        Ok(StartOutcome::Started)
                    }
                    Err(PlayerError::PolicyBlocked(message)) => Ok(StartOutcome::Blocked(message)),
                    Err(err) => {
                        self.fail_hard(&err);
                        Err(err)
                    }
                }
            }
            Mode::Stream(sm) => {
                let attempt = sm.output.ensure_running();
                match attempt {
                    Ok(()) => {
                        self.muted = true;
                        self.set_state(PlaybackState::Playing);
                        self.flush()?;
                        Ok(StartOutcome::Started)
                    }
                    Err(PlayerError::PolicyBlocked(message)) => Ok(StartOutcome::Blocked(message)),
                    Err(err) => {
                        self.fail_hard(&err);
                        Err(err)
                    }
                }
            }
            Mode::Inactive => Ok(StartOutcome::Started),
        }
    }

    // ===== Streaming =====

    /// Open a stream: allocate the buffer arena and start the output
    /// context. The first node starts when consolidated data exists.
    pub(crate) async fn begin_stream(&mut self, format: StreamFormat) -> Result<StartOutcome> {
        if matches!(self.mode, Mode::Stream(_)) {
            return Err(PlayerError::AlreadyStreaming);
        }
        let mut output = match self.host.create_stream_output() {
            Ok(output) => output,
            Err(err) => {
                self.fail_soft(&err);
                return Err(err);
            }
        };

        self.session += 1;
        self.reset_to_idle();
        self.set_state(PlaybackState::Loading);
        self.muted = false;
        debug!(
            "Stream opened: {} Hz, {} channel(s)",
            format.sample_rate.as_hz(),
            format.channels
        );

        let attempt = output.ensure_running();
        self.mode = Mode::Stream(StreamMode {
            output,
            arena: BufferArena::new(format),
            queue: PendingChunkQueue::new(),
            open: true,
            node: None,
        });
        match attempt {
            Ok(()) => {
                self.set_state(PlaybackState::Playing);
                Ok(StartOutcome::Started)
            }
            // The stream stays open while blocked; appends accumulate
            // until the gesture retry
            Err(PlayerError::PolicyBlocked(message)) => Ok(StartOutcome::Blocked(message)),
            Err(err) => {
                self.fail_hard(&err);
                Err(err)
            }
        }
    }

    /// Normalize one chunk, enqueue it, and run a consolidation pass
    pub(crate) fn append(&mut self, chunk: StreamChunk) -> Result<()> {
        match &self.mode {
            Mode::Stream(sm) if sm.open => {}
            _ => return Err(PlayerError::NotStreaming),
        }
        let samples = match chunk.into_samples() {
            Ok(samples) => samples,
            Err(err) => {
                // One bad chunk does not tear the stream down
                self.fail_soft(&err);
                return Err(err);
            }
        };
        if samples.is_empty() {
            return Ok(());
        }
        if let Mode::Stream(sm) = &mut self.mode {
            sm.queue.push(samples);
        }
        self.flush()
    }

    /// Close the stream to new appends and let buffered data drain.
    ///
    /// `Ended` fires when the active node finishes, or immediately if
    /// nothing is buffered. A stream closed while paused or blocked ends
    /// once it returns to `Playing`. No-op without an active stream.
    pub(crate) fn stop_stream(&mut self) {
        match &mut self.mode {
            Mode::Stream(sm) if sm.open => sm.open = false,
            _ => return,
        }
        debug!("Stream closed to new appends");
        let _ = self.flush();
        self.maybe_end_stream();
    }

    /// Merge queued chunks into the arena and start a node if needed
    fn flush(&mut self) -> Result<()> {
        let progress = {
            let Mode::Stream(sm) = &mut self.mode else {
                return Ok(());
            };
            sm.arena
                .consolidate(&mut sm.queue)
                .then(|| sm.arena.buffered_secs())
        };
        if let Some(buffered) = progress {
            self.events.emit(&PlayerEvent::Progress {
                buffered,
                duration: None,
            });
        }
        self.maybe_start_node()
    }

    /// Start an output node on the current generation when playback is
    /// active, no node is running, and unread frames exist
    fn maybe_start_node(&mut self) -> Result<()> {
        if self.state() != PlaybackState::Playing {
            return Ok(());
        }
        let rate = self.rate;
        let volume = self.effective_volume();
        let started = {
            let Mode::Stream(sm) = &mut self.mode else {
                return Ok(());
            };
            if sm.node.is_some() || sm.arena.unread_frames() == 0 {
                return Ok(());
            }
            let snapshot: Arc<BufferSnapshot> = sm.arena.snapshot();
            let from = sm.arena.read_position();
            let end = snapshot.frames();
            match sm.output.start_node(snapshot, from, rate, volume) {
                Ok(()) => {
                    sm.node = Some(NodeRun {
                        epoch: tokio::time::Instant::now(),
                        start_frame: from,
                        end_frame: end,
                        rate,
                    });
                    debug!(
                        "Output node started at frame {} of {} (generation {})",
                        from,
                        end,
                        sm.arena.generation()
                    );
                    Ok(())
                }
                Err(err) => Err(err),
            }
        };
        match started {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail_hard(&err);
                Err(err)
            }
        }
    }

    // ===== Transport =====

    pub(crate) fn pause(&mut self) {
        if self.state() != PlaybackState::Playing {
            return;
        }
        match &mut self.mode {
            Mode::Element(em) => em.element.pause(),
            Mode::Stream(sm) => {
                // Pin the read position where the node actually is
                if let Some(node) = sm.node.take() {
                    let hz = f64::from(sm.arena.format().sample_rate.as_hz());
                    let frame = node.current_frame(hz);
                    sm.output.stop_node();
                    sm.arena.set_read_position(frame);
                }
            }
            Mode::Inactive => return,
        }
        self.set_state(PlaybackState::Paused);
    }

    /// Resume paused playback. May hit the autoplay policy again, in
    /// which case `Blocked` is returned for the facade to negotiate.
    pub(crate) async fn resume(&mut self) -> Result<StartOutcome> {
        if self.state() != PlaybackState::Paused {
            return Ok(StartOutcome::Started);
        }
        match &mut self.mode {
            Mode::Element(em) => {
                let attempt = em.element.start().await;
                match attempt {
                    Ok(()) => {
                        self.set_state(PlaybackState::Playing);
                        Ok(StartOutcome::Started)
                    }
                    Err(PlayerError::PolicyBlocked(message)) => Ok(StartOutcome::Blocked(message)),
                    Err(err) => {
                        self.fail_hard(&err);
                        Err(err)
                    }
                }
            }
            Mode::Stream(sm) => {
                let attempt = sm.output.ensure_running();
                match attempt {
                    Ok(()) => {
                        self.set_state(PlaybackState::Playing);
                        self.flush()?;
                        // The stream may have been closed while paused
                        self.maybe_end_stream();
                        Ok(StartOutcome::Started)
                    }
                    Err(PlayerError::PolicyBlocked(message)) => Ok(StartOutcome::Blocked(message)),
                    Err(err) => {
                        self.fail_hard(&err);
                        Err(err)
                    }
                }
            }
            Mode::Inactive => Ok(StartOutcome::Started),
        }
    }

    /// Halt everything and reset to `Idle`. Idempotent.
    pub(crate) fn stop(&mut self) {
        self.session += 1;
        if matches!(self.mode, Mode::Inactive) && self.state() == PlaybackState::Idle {
            return;
        }
        self.reset_to_idle();
        let mut cell = self.status.lock().unwrap();
        cell.position = 0.0;
        cell.duration = None;
    }

    pub(crate) fn seek(&mut self, position_secs: f64) {
        let target = position_secs.max(0.0);
        let position = match &mut self.mode {
            Mode::Element(em) => {
                em.element.seek(target);
                em.element.position()
            }
            Mode::Stream(sm) => {
                let hz = f64::from(sm.arena.format().sample_rate.as_hz());
                if sm.node.take().is_some() {
                    sm.output.stop_node();
                }
                sm.arena.set_read_position((target * hz) as usize);
                sm.arena.read_position() as f64 / hz
            }
            Mode::Inactive => return,
        };
        let duration = self.status.lock().unwrap().duration;
        self.report_time(position, duration);
        let _ = self.maybe_start_node();
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        if clamped == self.volume {
            return;
        }
        self.volume = clamped;
        // During the muted fallback only the target moves; the ramp (or
        // the gesture retry) applies it to the output
        if !self.muted {
            self.apply_volume(clamped);
        }
        self.events.emit(&PlayerEvent::VolumeChange { volume: clamped });
    }

    pub(crate) fn set_playback_rate(&mut self, rate: f64) {
        let clamped = rate.clamp(0.5, 4.0);
        self.rate = clamped;
        match &mut self.mode {
            Mode::Element(em) => em.element.set_rate(clamped),
            Mode::Stream(sm) => {
                // A running node's rate is fixed; restart it at the new
                // rate from the current position
                if let Some(node) = sm.node.take() {
                    let hz = f64::from(sm.arena.format().sample_rate.as_hz());
                    let frame = node.current_frame(hz);
                    sm.output.stop_node();
                    sm.arena.set_read_position(frame);
                }
            }
            Mode::Inactive => {}
        }
        let _ = self.maybe_start_node();
    }

    // ===== Autoplay negotiation support =====

    pub(crate) fn enter_waiting(&mut self) {
        self.set_state(PlaybackState::WaitingForInteraction);
    }

    /// Retry the blocked start after a user gesture (or an explicit
    /// `resume_after_interaction`), at full volume.
    pub(crate) async fn retry_after_gesture(&mut self) -> Result<StartOutcome> {
        if self.state() != PlaybackState::WaitingForInteraction {
            return Ok(StartOutcome::Started);
        }
        let volume = self.volume;
        match &mut self.mode {
            Mode::Element(em) => {
                em.element.set_muted(false);
                em.element.set_volume(volume);
                let attempt = em.element.start().await;
                match attempt {
                    Ok(()) => {
                        self.muted = false;
                        self.set_state(PlaybackState::Playing);
                        debug!("Deferred playback started after user gesture");
                        Ok(StartOutcome::Started)
                    }
                    Err(PlayerError::PolicyBlocked(message)) => Ok(StartOutcome::Blocked(message)),
                    Err(err) => {
                        self.fail_hard(&err);
                        Err(err)
                    }
                }
            }
            Mode::Stream(sm) => {
                let attempt = sm.output.ensure_running();
                match attempt {
                    Ok(()) => {
                        self.muted = false;
                        self.set_state(PlaybackState::Playing);
                        debug!("Deferred stream started after user gesture");
                        self.flush()?;
                        // The stream may have been closed while blocked
                        self.maybe_end_stream();
                        Ok(StartOutcome::Started)
                    }
                    Err(PlayerError::PolicyBlocked(message)) => Ok(StartOutcome::Blocked(message)),
                    Err(err) => {
                        self.fail_hard(&err);
                        Err(err)
                    }
                }
            }
            Mode::Inactive => Ok(StartOutcome::Started),
        }
    }

    /// Lift the element's muted flag before the volume ramp begins.
    ///
    /// Output stays silent because the ramp starts from volume zero.
    pub(crate) fn begin_unmute(&mut self) {
        if !self.muted {
            return;
        }
        if let Mode::Element(em) = &mut self.mode {
            em.element.set_muted(false);
        }
    }

    /// Apply one volume ramp step; the final step ends the muted
    /// fallback and lands exactly on the target volume
    pub(crate) fn ramp_step(&mut self, step: u32, steps: u32) {
        if !self.muted {
            return;
        }
        let target = self.volume;
        let level = target * (step.min(steps) as f32 / steps as f32);
        self.apply_volume(level);
        if step >= steps {
            self.muted = false;
            debug!("Volume ramp complete at {:.2}", target);
            self.events.emit(&PlayerEvent::VolumeChange { volume: target });
        }
    }

    // ===== Progress tick =====

    /// One pass of the background progress task: poll positions, detect
    /// node/media completion, drive the flush-or-end logic.
    pub(crate) fn tick(&mut self) {
        match &mut self.mode {
            Mode::Inactive => {}
            Mode::Element(em) => {
                let position = em.element.position();
                let duration = em.element.duration();
                let ended = em.element.is_ended();
                if ended {
                    self.finish_element(duration);
                } else {
                    self.report_time(position, duration);
                }
            }
            Mode::Stream(sm) => {
                let hz = f64::from(sm.arena.format().sample_rate.as_hz());
                let finished = sm.output.take_finished();
                if finished {
                    if let Some(node) = sm.node.take() {
                        sm.arena.set_read_position(node.end_frame);
                    }
                }
                let position = match &sm.node {
                    Some(node) => node.position_secs(hz),
                    None => sm.arena.read_position() as f64 / hz,
                };
                self.report_time(position, None);

                if finished {
                    // Absorb chunks that arrived during the node's run
                    let _ = self.flush();
                }
                // The drain and the close can land on different ticks
                self.maybe_end_stream();
            }
        }
    }

    // ===== Internals =====

    fn finish_element(&mut self, duration: Option<f64>) {
        debug!("Media ended");
        if let Mode::Element(em) = &mut self.mode {
            em.element.stop();
        }
        self.mode = Mode::Inactive;
        if let Some(duration) = duration {
            self.report_time(duration, Some(duration));
        }
        self.set_state(PlaybackState::Ended);
    }

    fn end_stream(&mut self) {
        debug!("Stream drained");
        self.mode = Mode::Inactive;
        self.set_state(PlaybackState::Ended);
    }

    /// End a closed stream once nothing is left to play.
    ///
    /// The buffer can drain while the stream is still open, and the close
    /// can arrive while paused or blocked, so the resume paths and the
    /// progress tick all run this check. Only a `Playing` stream ends.
    fn maybe_end_stream(&mut self) {
        let drained = match &self.mode {
            Mode::Stream(sm) => {
                !sm.open
                    && sm.node.is_none()
                    && sm.arena.unread_frames() == 0
                    && sm.queue.is_empty()
            }
            _ => false,
        };
        if drained && self.state() == PlaybackState::Playing {
            self.end_stream();
        }
    }

    /// Tear down the active mode and return to `Idle`
    fn reset_to_idle(&mut self) {
        match &mut self.mode {
            Mode::Element(em) => em.element.stop(),
            Mode::Stream(sm) => sm.output.stop_node(),
            Mode::Inactive => {}
        }
        self.mode = Mode::Inactive;
        self.set_state(PlaybackState::Idle);
    }

    fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    fn apply_volume(&mut self, volume: f32) {
        match &mut self.mode {
            Mode::Element(em) => em.element.set_volume(volume),
            Mode::Stream(sm) => sm.output.set_volume(volume),
            Mode::Inactive => {}
        }
    }

    /// Record a state transition and emit its event. No-op if the state
    /// is unchanged.
    fn set_state(&mut self, next: PlaybackState) {
        let previous = {
            let mut cell = self.status.lock().unwrap();
            let previous = cell.state;
            if previous == next {
                return;
            }
            cell.state = next;
            previous
        };
        debug!("State transition: {} -> {}", previous, next);
        match next {
            PlaybackState::Playing => self.events.emit(&PlayerEvent::Play),
            PlaybackState::Paused => self.events.emit(&PlayerEvent::Pause),
            PlaybackState::Idle => self.events.emit(&PlayerEvent::Stop),
            PlaybackState::Ended => self.events.emit(&PlayerEvent::Ended),
            PlaybackState::Loading
            | PlaybackState::Error
            | PlaybackState::WaitingForInteraction => {}
        }
    }

    /// Update the position cell; emit `TimeUpdate` only when the
    /// position actually changed
    fn report_time(&self, position: f64, duration: Option<f64>) {
        let changed = {
            let mut cell = self.status.lock().unwrap();
            let changed = cell.position != position;
            cell.position = position;
            cell.duration = duration;
            changed
        };
        if changed {
            self.events.emit(&PlayerEvent::TimeUpdate { position, duration });
        }
    }

    /// Report an error that leaves the engine state intact (capability
    /// gaps, one bad chunk)
    fn fail_soft(&self, err: &PlayerError) {
        warn!("Playback error (state preserved): {}", err);
        self.events.emit(&PlayerEvent::Error {
            message: err.to_string(),
        });
    }

    /// Report an error that ends the session: emit and flip to `Error`
    fn fail_hard(&mut self, err: &PlayerError) {
        error!("Playback failed: {}", err);
        self.events.emit(&PlayerEvent::Error {
            message: err.to_string(),
        });
        self.mode = Mode::Inactive;
        self.set_state(PlaybackState::Error);
    }
}
