/// Chime Demo - Command-line playback demo for the Chime engine
use chime_audio_desktop::DesktopHost;
use chime_core::{MediaSource, PlatformHost, StreamFormat};
use chime_playback::{AudioPlayer, EventKind, PermissionBroker, PlayerEvent};
use clap::{Parser, Subcommand};
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chime-demo")]
#[command(about = "Chime Player desktop playback demo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play an audio file to its end
    Play {
        /// Audio file path (WAV, FLAC, MP3, OGG)
        path: PathBuf,
        /// Playback volume (0.0 to 1.0)
        #[arg(long, default_value_t = 1.0)]
        volume: f32,
    },
    /// Stream a generated sine tone through the chunk pipeline
    Stream {
        /// Tone length in seconds
        #[arg(long, default_value_t = 3)]
        seconds: u32,
        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        freq: f32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chime_playback=info,chime_audio_desktop=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let host = DesktopHost::new();
    let broker = PermissionBroker::new(host.gesture_source());
    let player = AudioPlayer::new(host, broker);

    match cli.command {
        Commands::Play { path, volume } => {
            play_file(&player, path, volume).await?;
        }
        Commands::Stream { seconds, freq } => {
            stream_tone(&player, seconds, freq).await?;
        }
    }

    player.destroy().await;
    Ok(())
}

/// Play one file and print progress until it ends
async fn play_file(player: &AudioPlayer, path: PathBuf, volume: f32) -> anyhow::Result<()> {
    let done = Arc::new(Notify::new());

    let done_tx = Arc::clone(&done);
    player.on(EventKind::Ended, move |_| done_tx.notify_one());
    let done_tx = Arc::clone(&done);
    player.on(EventKind::Error, move |event| {
        if let PlayerEvent::Error { message } = event {
            eprintln!("playback error: {message}");
        }
        done_tx.notify_one();
    });
    player.on(EventKind::TimeUpdate, |event| {
        if let PlayerEvent::TimeUpdate { position, duration } = event {
            match duration {
                Some(total) => println!("  {position:6.1} s / {total:.1} s"),
                None => println!("  {position:6.1} s"),
            }
        }
    });

    player.set_volume(volume).await?;
    println!("Playing {}", path.display());
    player.play(MediaSource::File(path)).await?;

    done.notified().await;
    Ok(())
}

/// Generate a sine tone and feed it through the streaming path in
/// real time, the way a live decoder or network feed would
async fn stream_tone(player: &AudioPlayer, seconds: u32, freq: f32) -> anyhow::Result<()> {
    let format = StreamFormat::speech_mono();
    let rate = format.sample_rate.as_hz();

    let done = Arc::new(Notify::new());
    let done_tx = Arc::clone(&done);
    player.on(EventKind::Ended, move |_| done_tx.notify_one());

    println!("Streaming a {freq} Hz tone for {seconds} s");
    player.start_stream_with(format).await?;

    // 100 ms chunks keep the pending queue shallow
    let chunk_frames = (rate / 10) as usize;
    let total_frames = (rate * seconds) as usize;
    let mut offset = 0usize;
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    while offset < total_frames {
        ticker.tick().await;
        let frames = chunk_frames.min(total_frames - offset);
        let chunk: Vec<i16> = (0..frames)
            .map(|i| {
                let t = (offset + i) as f32 / rate as f32;
                ((TAU * freq * t).sin() * 0.4 * f32::from(i16::MAX)) as i16
            })
            .collect();
        player.append_stream_data(chunk).await?;
        offset += frames;
    }

    player.stop_stream().await?;
    if tokio::time::timeout(Duration::from_secs(10), done.notified())
        .await
        .is_err()
    {
        eprintln!("stream did not finish draining, giving up");
    }
    println!("Done");
    Ok(())
}
