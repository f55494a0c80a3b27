//! CPAL-backed real-time stream output
//!
//! A dedicated audio thread owns the CPAL `Stream` (the stream handle is
//! not `Send` on every platform); the control side talks to it over a
//! bounded channel. The callback reads the pinned planar snapshot through
//! a fractional cursor (`step = rate x snapshot_rate / device_rate`) with
//! linear interpolation, so playback rate and device rate differences are
//! handled without a resampling pass.

use crate::error::{AudioError, Result};
use chime_core::{BufferSnapshot, StreamOutput};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Commands sent to the audio thread
enum NodeCommand {
    /// Replace the active node with a fresh one
    Start {
        snapshot: Arc<BufferSnapshot>,
        from_frame: usize,
        rate: f64,
    },
    /// Drop the active node
    Stop,
    /// No-op used to probe whether the thread is alive
    Ping,
    /// Exit the audio thread
    Shutdown,
}

/// State shared between the control side and the audio callback
struct NodeShared {
    /// A node exists and has not finished or been stopped
    active: AtomicBool,
    /// Latched when a node consumes its snapshot to the end
    finished: AtomicBool,
    /// Volume applied to the active and future nodes
    volume: Mutex<f32>,
}

impl NodeShared {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            volume: Mutex::new(1.0),
        }
    }
}

/// CPAL implementation of [`StreamOutput`].
///
/// Plays one pinned [`BufferSnapshot`] generation at a time; growing the
/// stream means the engine lets the node finish and starts a new node on
/// the next generation. Desktop output contexts never require a user
/// gesture, so `ensure_running` never reports a policy block.
pub struct CpalStreamOutput {
    command_tx: Sender<NodeCommand>,
    shared: Arc<NodeShared>,
    sample_rate: u32,
    _audio_thread: Option<JoinHandle<()>>,
}

impl CpalStreamOutput {
    /// Open the default output device and spawn the audio thread.
    ///
    /// # Errors
    /// `DeviceNotFound` if the host has no output device, `StreamBuild`
    /// if its configuration cannot be read.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::DeviceNotFound)?;
        let supported = device.default_output_config()?;
        let sample_rate = supported.sample_rate();
        let config = supported.config();

        let label = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown device".to_string());
        debug!(
            "Stream output ready: {} ({} Hz, {} ch)",
            label, sample_rate, config.channels
        );

        let shared = Arc::new(NodeShared::new());
        let (command_tx, command_rx) = bounded::<NodeCommand>(32);

        let thread_shared = Arc::clone(&shared);
        let audio_thread = thread::Builder::new()
            .name("chime-stream-out".to_string())
            .spawn(move || {
                audio_thread_run(device, config, sample_rate, thread_shared, command_rx);
            })
            .map_err(|e| AudioError::ThreadGone(e.to_string()))?;

        Ok(Self {
            command_tx,
            shared,
            sample_rate,
            _audio_thread: Some(audio_thread),
        })
    }

    /// Sample rate of the output device in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn send(&self, command: NodeCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| AudioError::ThreadGone("audio thread stopped".to_string()))
    }
}

impl StreamOutput for CpalStreamOutput {
    fn ensure_running(&mut self) -> chime_core::Result<()> {
        if self.command_tx.send(NodeCommand::Ping).is_ok() {
            return Ok(());
        }
        // The audio thread exited, usually because the device went away.
        // Reopen from scratch; a missing device surfaces as Unsupported.
        debug!("Audio thread gone, reopening output device");
        *self = Self::new()?;
        Ok(())
    }

    fn start_node(
        &mut self,
        snapshot: Arc<BufferSnapshot>,
        from_frame: usize,
        rate: f64,
        volume: f32,
    ) -> chime_core::Result<()> {
        *self.shared.volume.lock().unwrap() = volume;
        self.shared.finished.store(false, Ordering::SeqCst);
        self.shared.active.store(true, Ordering::SeqCst);
        self.send(NodeCommand::Start {
            snapshot,
            from_frame,
            rate,
        })
        .map_err(|err| {
            self.shared.active.store(false, Ordering::SeqCst);
            err.into()
        })
    }

    fn stop_node(&mut self) {
        // A manual stop never counts as a natural finish
        self.shared.active.store(false, Ordering::SeqCst);
        if self.send(NodeCommand::Stop).is_err() {
            warn!("Audio thread gone, node already stopped");
        }
    }

    fn node_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    fn take_finished(&mut self) -> bool {
        self.shared.finished.swap(false, Ordering::SeqCst)
    }

    fn set_volume(&mut self, volume: f32) {
        *self.shared.volume.lock().unwrap() = volume;
    }
}

impl Drop for CpalStreamOutput {
    fn drop(&mut self) {
        let _ = self.command_tx.send(NodeCommand::Shutdown);
    }
}

/// Audio thread main loop.
///
/// Owns the CPAL stream; each `Start` command tears down the previous
/// stream and builds a fresh one over the new snapshot.
fn audio_thread_run(
    device: Device,
    config: StreamConfig,
    device_rate: u32,
    shared: Arc<NodeShared>,
    command_rx: Receiver<NodeCommand>,
) {
    let mut stream: Option<Stream> = None;

    while let Ok(command) = command_rx.recv() {
        match command {
            NodeCommand::Start {
                snapshot,
                from_frame,
                rate,
            } => {
                stream = None;

                let snapshot_rate = snapshot.format().sample_rate.as_hz();
                let step = rate * f64::from(snapshot_rate) / f64::from(device_rate);
                let device_channels = usize::from(config.channels);
                let mut cursor = from_frame as f64;
                let mut done = false;

                let shared_cb = Arc::clone(&shared);
                let built = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        render_node(
                            data,
                            &snapshot,
                            &shared_cb,
                            &mut cursor,
                            step,
                            device_channels,
                            &mut done,
                        );
                    },
                    |err| warn!("Output stream error: {}", err),
                    None,
                );
                match built {
                    Ok(s) => match s.play() {
                        Ok(()) => stream = Some(s),
                        Err(e) => {
                            error!("Failed to start output stream: {}", e);
                            shared.active.store(false, Ordering::SeqCst);
                        }
                    },
                    Err(e) => {
                        error!("Failed to build output stream: {}", e);
                        shared.active.store(false, Ordering::SeqCst);
                    }
                }
            }
            NodeCommand::Stop => {
                stream = None;
            }
            NodeCommand::Ping => {}
            NodeCommand::Shutdown => {
                break;
            }
        }
    }
}

/// Fill one output buffer from the pinned snapshot.
///
/// Runs on the real-time audio callback. Past the end of the snapshot the
/// buffer is filled with silence and the finished flag latches once.
fn render_node(
    output: &mut [f32],
    snapshot: &BufferSnapshot,
    shared: &NodeShared,
    cursor: &mut f64,
    step: f64,
    device_channels: usize,
    done: &mut bool,
) {
    if *done || !shared.active.load(Ordering::Relaxed) {
        output.fill(0.0);
        return;
    }

    let frames_len = snapshot.frames();
    let volume = *shared.volume.lock().unwrap();

    for frame in output.chunks_mut(device_channels) {
        let idx = *cursor as usize;
        if idx >= frames_len {
            frame.fill(0.0);
            continue;
        }
        let frac = (*cursor - idx as f64) as f32;
        for (ch, sample) in frame.iter_mut().enumerate() {
            *sample = mix_sample(snapshot, idx, frac, ch, device_channels) * volume;
        }
        *cursor += step;
    }

    if *cursor as usize >= frames_len {
        *done = true;
        shared.finished.store(true, Ordering::SeqCst);
        shared.active.store(false, Ordering::SeqCst);
    }
}

/// Map one snapshot frame onto a device channel.
///
/// Mono replicates to every device channel, stereo folds to mono by
/// averaging, extra device channels clamp to the last source channel.
fn mix_sample(
    snapshot: &BufferSnapshot,
    idx: usize,
    frac: f32,
    device_ch: usize,
    device_channels: usize,
) -> f32 {
    let src_channels = snapshot.channel_count();
    if src_channels == 2 && device_channels == 1 {
        0.5 * (read_channel(snapshot, 0, idx, frac) + read_channel(snapshot, 1, idx, frac))
    } else {
        read_channel(snapshot, device_ch.min(src_channels - 1), idx, frac)
    }
}

/// Read one channel at a fractional frame position, interpolating
/// linearly; the last frame holds its value.
fn read_channel(snapshot: &BufferSnapshot, ch: usize, idx: usize, frac: f32) -> f32 {
    let data = snapshot.channel(ch);
    let current = data[idx];
    let next = if idx + 1 < data.len() {
        data[idx + 1]
    } else {
        current
    };
    current + (next - current) * frac
}
