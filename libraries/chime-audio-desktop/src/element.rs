//! Symphonia-backed media element
//!
//! `load` decodes the entire source on a blocking worker into interleaved
//! stereo f32 at the device rate. Transport controls then operate on
//! shared state only. A dedicated audio thread owns the CPAL `Stream`;
//! the callback advances a fractional cursor over the decoded track, so
//! playback rate changes need no second resampling pass.

use crate::error::{AudioError, Result};
use async_trait::async_trait;
use chime_core::{MediaElement, MediaSource, PlayerError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::task;
use tracing::{debug, error, warn};

/// Commands sent to the audio thread
enum TrackCommand {
    /// Build the output stream if needed and start rendering
    Start,
    /// Suspend the output stream, keeping the position
    Pause,
    /// Tear down the output stream
    Stop,
    /// Exit the audio thread
    Shutdown,
}

/// A fully decoded track: interleaved stereo f32 at the device rate
#[derive(Debug)]
struct DecodedTrack {
    samples: Arc<Vec<f32>>,
    frames: usize,
    duration_secs: f64,
}

/// State shared between the control side and the audio callback
struct TrackShared {
    /// Interleaved stereo samples at the device rate
    samples: Mutex<Arc<Vec<f32>>>,
    /// Playback position in frames, fractional between frames
    cursor: Mutex<f64>,
    playing: AtomicBool,
    /// Latched when the cursor consumed the track to its end
    ended: AtomicBool,
    muted: AtomicBool,
    volume: Mutex<f32>,
    rate: Mutex<f64>,
}

impl TrackShared {
    fn new() -> Self {
        Self {
            samples: Mutex::new(Arc::new(Vec::new())),
            cursor: Mutex::new(0.0),
            playing: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            volume: Mutex::new(1.0),
            rate: Mutex::new(1.0),
        }
    }
}

/// Desktop [`MediaElement`] decoding through Symphonia and playing
/// through CPAL.
///
/// Desktop playback never requires a user gesture, so `start` never
/// reports a policy block. URL sources are not resolved on this host;
/// callers hand over local files or in-memory blobs.
pub struct SymphoniaMediaElement {
    command_tx: Sender<TrackCommand>,
    shared: Arc<TrackShared>,
    device_rate: u32,
    track: Option<DecodedTrack>,
    volume: f32,
    _audio_thread: Option<JoinHandle<()>>,
}

impl SymphoniaMediaElement {
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
        let device_rate = supported.sample_rate();
        let config = supported.config();

        let label = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown device".to_string());
        debug!(
            "Media output ready: {} ({} Hz, {} ch)",
            label, device_rate, config.channels
        );

        let shared = Arc::new(TrackShared::new());
        let (command_tx, command_rx) = bounded::<TrackCommand>(32);

        let thread_shared = Arc::clone(&shared);
        let audio_thread = thread::Builder::new()
            .name("chime-media-out".to_string())
            .spawn(move || {
                audio_thread_run(device, config, thread_shared, command_rx);
            })
            .map_err(|e| AudioError::ThreadGone(e.to_string()))?;

        Ok(Self {
            command_tx,
            shared,
            device_rate,
            track: None,
            volume: 1.0,
            _audio_thread: Some(audio_thread),
        })
    }

    fn send(&self, command: TrackCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| AudioError::ThreadGone("audio thread stopped".to_string()))
    }
}

#[async_trait]
impl MediaElement for SymphoniaMediaElement {
    async fn load(&mut self, source: MediaSource) -> chime_core::Result<()> {
        // An element never holds two sources at once
        self.stop();

        debug!("Loading media: {}", source.describe());
        let device_rate = self.device_rate;
        let track = task::spawn_blocking(move || decode_source(&source, device_rate))
            .await
            .map_err(|e| PlayerError::media_load(format!("decode task failed: {e}")))??;

        *self.shared.samples.lock().unwrap() = Arc::clone(&track.samples);
        *self.shared.cursor.lock().unwrap() = 0.0;
        self.shared.ended.store(false, Ordering::SeqCst);
        self.track = Some(track);
        Ok(())
    }

    async fn start(&mut self) -> chime_core::Result<()> {
        if self.track.is_none() {
            return Err(PlayerError::output("no media loaded"));
        }
        // Starting an ended element rewinds and plays again
        if self.shared.ended.swap(false, Ordering::SeqCst) {
            *self.shared.cursor.lock().unwrap() = 0.0;
        }
        self.shared.playing.store(true, Ordering::SeqCst);
        self.send(TrackCommand::Start).map_err(|err| {
            self.shared.playing.store(false, Ordering::SeqCst);
            err
        })?;
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        if self.send(TrackCommand::Pause).is_err() {
            warn!("Audio thread gone, media stream already paused");
        }
    }

    fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.ended.store(false, Ordering::SeqCst);
        *self.shared.cursor.lock().unwrap() = 0.0;
        *self.shared.samples.lock().unwrap() = Arc::new(Vec::new());
        self.track = None;
        if self.send(TrackCommand::Stop).is_err() {
            warn!("Audio thread gone, media stream already stopped");
        }
    }

    fn seek(&mut self, position_secs: f64) {
        let Some(track) = &self.track else {
            return;
        };
        let clamped = position_secs.clamp(0.0, track.duration_secs);
        let frame = (clamped * f64::from(self.device_rate)).min(track.frames as f64);
        *self.shared.cursor.lock().unwrap() = frame;
        if (frame as usize) < track.frames {
            self.shared.ended.store(false, Ordering::SeqCst);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        *self.shared.volume.lock().unwrap() = volume;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_muted(&mut self, muted: bool) {
        self.shared.muted.store(muted, Ordering::SeqCst);
    }

    fn set_rate(&mut self, rate: f64) {
        *self.shared.rate.lock().unwrap() = rate;
    }

    fn position(&self) -> f64 {
        let Some(track) = &self.track else {
            return 0.0;
        };
        let secs = *self.shared.cursor.lock().unwrap() / f64::from(self.device_rate);
        secs.min(track.duration_secs)
    }

    fn duration(&self) -> Option<f64> {
        self.track.as_ref().map(|track| track.duration_secs)
    }

    fn is_ended(&self) -> bool {
        self.shared.ended.load(Ordering::SeqCst)
    }
}

impl Drop for SymphoniaMediaElement {
    fn drop(&mut self) {
        let _ = self.command_tx.send(TrackCommand::Shutdown);
    }
}

/// Audio thread main loop.
///
/// Owns the CPAL stream. The stream is built lazily on the first `Start`
/// and kept across pause/resume; `Stop` tears it down.
fn audio_thread_run(
    device: Device,
    config: StreamConfig,
    shared: Arc<TrackShared>,
    command_rx: Receiver<TrackCommand>,
) {
    let mut stream: Option<Stream> = None;

    while let Ok(command) = command_rx.recv() {
        match command {
            TrackCommand::Start => {
                if stream.is_none() {
                    stream = build_track_stream(&device, &config, &shared);
                }
                match &stream {
                    Some(s) => {
                        if let Err(e) = s.play() {
                            error!("Failed to start media stream: {}", e);
                            shared.playing.store(false, Ordering::SeqCst);
                        }
                    }
                    None => shared.playing.store(false, Ordering::SeqCst),
                }
            }
            TrackCommand::Pause => {
                if let Some(s) = &stream {
                    if let Err(e) = s.pause() {
                        warn!("Failed to pause media stream: {}", e);
                    }
                }
            }
            TrackCommand::Stop => {
                stream = None;
            }
            TrackCommand::Shutdown => {
                break;
            }
        }
    }
}

/// Build the device output stream over the shared track state
fn build_track_stream(
    device: &Device,
    config: &StreamConfig,
    shared: &Arc<TrackShared>,
) -> Option<Stream> {
    let device_channels = usize::from(config.channels);
    let shared_cb = Arc::clone(shared);
    let built = device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            render_track(data, &shared_cb, device_channels);
        },
        |err| warn!("Media stream error: {}", err),
        None,
    );
    match built {
        Ok(s) => Some(s),
        Err(e) => {
            error!("Failed to build media stream: {}", e);
            None
        }
    }
}

/// Fill one output buffer from the shared track.
///
/// Runs on the real-time audio callback. The cursor lock is held across
/// the whole buffer so a concurrent seek lands before or after it, never
/// in the middle.
fn render_track(output: &mut [f32], shared: &TrackShared, device_channels: usize) {
    if !shared.playing.load(Ordering::Relaxed) {
        output.fill(0.0);
        return;
    }

    let samples = Arc::clone(&*shared.samples.lock().unwrap());
    let frames_len = samples.len() / 2;
    let volume = if shared.muted.load(Ordering::Relaxed) {
        0.0
    } else {
        *shared.volume.lock().unwrap()
    };
    let step = *shared.rate.lock().unwrap();

    let mut cursor = shared.cursor.lock().unwrap();
    for frame in output.chunks_mut(device_channels) {
        let idx = *cursor as usize;
        if idx >= frames_len {
            frame.fill(0.0);
            continue;
        }
        let frac = (*cursor - idx as f64) as f32;
        let left = interpolate(&samples, idx, frac, frames_len, 0);
        let right = interpolate(&samples, idx, frac, frames_len, 1);
        for (ch, sample) in frame.iter_mut().enumerate() {
            let value = match (device_channels, ch) {
                (1, _) => 0.5 * (left + right),
                (_, 0) => left,
                // Extra device channels mirror the right channel
                _ => right,
            };
            *sample = value * volume;
        }
        *cursor += step;
    }

    if frames_len > 0 && *cursor as usize >= frames_len {
        shared.playing.store(false, Ordering::SeqCst);
        shared.ended.store(true, Ordering::SeqCst);
    }
}

/// Read one channel at a fractional frame position from interleaved
/// stereo, interpolating linearly; the last frame holds its value.
fn interpolate(samples: &[f32], idx: usize, frac: f32, frames_len: usize, ch: usize) -> f32 {
    let current = samples[idx * 2 + ch];
    let next = if idx + 1 < frames_len {
        samples[(idx + 1) * 2 + ch]
    } else {
        current
    };
    current + (next - current) * frac
}

/// Decode a media source to interleaved stereo f32 at the device rate.
///
/// Runs on a blocking worker; decoding a long file takes a while.
fn decode_source(source: &MediaSource, device_rate: u32) -> Result<DecodedTrack> {
    let mut hint = Hint::new();
    let reader: Box<dyn symphonia::core::io::MediaSource> = match source {
        MediaSource::Url(url) => {
            return Err(AudioError::UnsupportedSource(format!(
                "URL sources are not resolved on the desktop host: {url}"
            )));
        }
        MediaSource::File(path) => {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                hint.with_extension(ext);
            }
            let file = std::fs::File::open(path)
                .map_err(|e| AudioError::Decode(format!("{}: {e}", path.display())))?;
            Box::new(file)
        }
        MediaSource::Bytes(data) => Box::new(Cursor::new(data.clone())),
    };

    let mss = MediaSourceStream::new(reader, Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode(format!("unrecognized container: {e}")))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioError::Decode("no default track".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params.sample_rate.unwrap_or(device_rate);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => samples.extend(convert_stereo(&decoded)),
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet skips, the rest of the track still plays
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        }
    }

    if samples.is_empty() {
        return Err(AudioError::Decode("no audio samples in source".to_string()));
    }

    let samples = if source_rate == device_rate {
        samples
    } else {
        resample_stereo(&samples, source_rate, device_rate)?
    };

    let frames = samples.len() / 2;
    let duration_secs = frames as f64 / f64::from(device_rate);
    debug!(
        "Decoded {}: {} frames at {} Hz ({:.2} s)",
        source.describe(),
        frames,
        device_rate,
        duration_secs
    );

    Ok(DecodedTrack {
        samples: Arc::new(samples),
        frames,
        duration_secs,
    })
}

/// Convert one decoded buffer to interleaved stereo f32.
///
/// All sample formats normalize to [-1.0, 1.0]; mono lands in both
/// channels, channels past the first two are dropped.
fn convert_stereo(decoded: &AudioBufferRef<'_>) -> Vec<f32> {
    match decoded {
        AudioBufferRef::F32(buf) => interleave_stereo(buf, |s| s),
        AudioBufferRef::F64(buf) => interleave_stereo(buf, |s| s as f32),
        AudioBufferRef::S8(buf) => interleave_stereo(buf, |s| s as f32 / i8::MAX as f32),
        AudioBufferRef::S16(buf) => interleave_stereo(buf, |s| s as f32 / i16::MAX as f32),
        AudioBufferRef::S24(buf) => interleave_stereo(buf, |s| s.inner() as f32 / 8_388_607.0),
        AudioBufferRef::S32(buf) => interleave_stereo(buf, |s| s as f32 / i32::MAX as f32),
        AudioBufferRef::U8(buf) => {
            interleave_stereo(buf, |s| (s as f32 / u8::MAX as f32) * 2.0 - 1.0)
        }
        AudioBufferRef::U16(buf) => {
            interleave_stereo(buf, |s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
        }
        AudioBufferRef::U24(buf) => {
            interleave_stereo(buf, |s| (s.inner() as f32 / 16_777_215.0) * 2.0 - 1.0)
        }
        AudioBufferRef::U32(buf) => {
            interleave_stereo(buf, |s| (s as f32 / u32::MAX as f32) * 2.0 - 1.0)
        }
    }
}

/// Interleave a planar buffer to stereo f32 through a normalizing
/// closure; mono duplicates into both output channels.
fn interleave_stereo<T, F>(buf: &symphonia::core::audio::AudioBuffer<T>, normalize: F) -> Vec<f32>
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    let mut output = Vec::with_capacity(frames * 2);

    for frame_idx in 0..frames {
        let left = normalize(buf.chan(0)[frame_idx]);
        let right = if channels > 1 {
            normalize(buf.chan(1)[frame_idx])
        } else {
            left
        };
        output.push(left);
        output.push(right);
    }

    output
}

/// Resample interleaved stereo in one pass over the whole track
fn resample_stereo(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    let frames = samples.len() / 2;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        f64::from(target_rate) / f64::from(source_rate),
        2.0,
        params,
        frames,
        2,
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    let mut deinterleaved = vec![Vec::with_capacity(frames); 2];
    for frame in samples.chunks_exact(2) {
        deinterleaved[0].push(frame[0]);
        deinterleaved[1].push(frame[1]);
    }

    let resampled = resampler
        .process(&deinterleaved, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let output_frames = resampled[0].len();
    let mut interleaved = Vec::with_capacity(output_frames * 2);
    for frame_idx in 0..output_frames {
        interleaved.push(resampled[0][frame_idx]);
        interleaved.push(resampled[1][frame_idx]);
    }

    Ok(interleaved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::{wav, StreamFormat};
    use std::path::Path;
    use std::time::Duration;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decode_matches_source_when_rates_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        // 1600 stereo frames: full scale left, silent right
        let samples: Vec<i16> = (0..1_600).flat_map(|_| [i16::MAX, 0]).collect();
        write_wav(&path, 16_000, 2, &samples);

        let track = decode_source(&MediaSource::File(path), 16_000).unwrap();
        assert_eq!(track.frames, 1_600);
        assert!((track.duration_secs - 0.1).abs() < 1e-6);
        assert!((track.samples[0] - 1.0).abs() < 1e-6);
        assert!(track.samples[1].abs() < 1e-6);
    }

    #[test]
    fn mono_lands_in_both_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 16_000, 1, &vec![8_192; 160]);

        let track = decode_source(&MediaSource::File(path), 16_000).unwrap();
        assert_eq!(track.frames, 160);
        assert!((track.samples[0] - track.samples[1]).abs() < 1e-6);
        assert!(track.samples[0] > 0.2);
    }

    #[test]
    fn resampling_preserves_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.wav");
        // 200 ms at 16 kHz decoded for a 48 kHz device
        write_wav(&path, 16_000, 1, &vec![0; 3_200]);

        let track = decode_source(&MediaSource::File(path), 48_000).unwrap();
        assert!((track.duration_secs - 0.2).abs() < 0.02);
    }

    #[test]
    fn blob_sources_decode() {
        let clip = wav::silent_wav(100, StreamFormat::speech_mono());
        let track = decode_source(&MediaSource::Bytes(clip), 16_000).unwrap();
        assert_eq!(track.frames, 1_600);
        assert!(track.samples.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn url_sources_are_rejected() {
        let source = MediaSource::Url("https://example.com/a.mp3".into());
        let err = decode_source(&source, 48_000).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedSource(_)));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let source = MediaSource::File("/no/such/clip.wav".into());
        let err = decode_source(&source, 48_000).unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = decode_source(&MediaSource::Bytes(vec![0; 64]), 48_000).unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn create_element() {
        // Skipped in headless environments without an output device
        match SymphoniaMediaElement::new() {
            Ok(element) => {
                assert!(element.duration().is_none());
                assert!(!element.is_ended());
            }
            Err(AudioError::DeviceNotFound | AudioError::StreamBuild(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn plays_to_end_and_replays() {
        let Ok(mut element) = SymphoniaMediaElement::new() else {
            return; // no device
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        // 100 ms of silence
        write_wav(&path, 16_000, 1, &vec![0; 1_600]);

        element.load(MediaSource::File(path)).await.unwrap();
        element.set_volume(0.0);
        element.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(element.is_ended());

        // Starting an ended element rewinds and plays again
        element.start().await.unwrap();
        assert!(!element.is_ended());
        assert!(element.position() < 0.05);
        element.stop();
    }

    #[tokio::test]
    async fn pause_freezes_position() {
        let Ok(mut element) = SymphoniaMediaElement::new() else {
            return; // no device
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        // 10 s of silence will not finish during the test
        write_wav(&path, 16_000, 1, &vec![0; 160_000]);

        element.load(MediaSource::File(path)).await.unwrap();
        element.set_volume(0.0);
        element.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        element.pause();
        let held = element.position();
        assert!(held > 0.0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!((element.position() - held).abs() < f64::EPSILON);

        // Seeking while paused moves the reported position
        element.seek(5.0);
        assert!((element.position() - 5.0).abs() < 1e-6);
        element.stop();
    }
}
