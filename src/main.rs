use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use agrivoice::voice::capture::{CaptureSource, MicSource};
use agrivoice::voice::playback::{DeviceOut, PlaybackScheduler};
use agrivoice::voice::session::{MicAndSpeaker, VoiceSession};
use agrivoice::voice::{ConnectParams, LoopbackConnector, OUTPUT_SAMPLE_RATE, codec};
use agrivoice::{Assistant, Config, Location};

/// AgriVoice - field-ready assistant gateway for farmers
#[derive(Parser)]
#[command(name = "agrivoice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a live voice session
    Voice {
        /// Use the in-process echo channel instead of a remote service
        #[arg(long)]
        echo: bool,
    },
    /// Ask a grounded question
    Ask {
        /// Question text
        prompt: String,
        /// Latitude for location-aware answers
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        /// Longitude for location-aware answers
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    /// Fetch the market insight summary
    Market {
        /// Latitude for regional context
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        /// Longitude for regional context
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the captured audio to a WAV file
        #[arg(long)]
        save: Option<std::path::PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,agrivoice=info",
        1 => "info,agrivoice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Voice { echo } => run_voice(echo).await,
        Command::Ask { prompt, lat, lng } => run_ask(&prompt, location_from(lat, lng)).await,
        Command::Market { lat, lng } => run_market(location_from(lat, lng)).await,
        Command::TestMic { duration, save } => test_mic(duration, save.as_deref()).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

fn location_from(lat: Option<f64>, lng: Option<f64>) -> Option<Location> {
    Some(Location {
        lat: lat?,
        lng: lng?,
    })
}

/// Run a live voice session until interrupted
#[allow(clippy::future_not_send)]
async fn run_voice(echo: bool) -> anyhow::Result<()> {
    if !echo {
        anyhow::bail!(
            "no live transport configured; run with --echo for the local loopback channel"
        );
    }

    let config = Config::load()?;
    let params = ConnectParams::audio(
        config.voice.live_model.clone(),
        config.voice.system_instruction.clone(),
    );

    // cpal streams aren't Send; the session runs on the main task
    let mut session = VoiceSession::new(MicAndSpeaker);
    session.start(&LoopbackConnector, params).await?;
    println!("Voice session active. Press Ctrl+C to stop.");

    // Set up shutdown signal
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    let final_state = session.run(&mut shutdown_rx).await;
    session.stop().await;

    println!("Session ended: {final_state:?}");
    Ok(())
}

/// Ask a grounded question and print the answer with sources
async fn run_ask(prompt: &str, location: Option<Location>) -> anyhow::Result<()> {
    let assistant = build_assistant()?;
    let answer = assistant.ask(prompt, location).await?;

    println!("{}", answer.text);
    print_sources(&answer.sources);
    Ok(())
}

/// Print the market insight summary
async fn run_market(location: Option<Location>) -> anyhow::Result<()> {
    let assistant = build_assistant()?;
    let answer = assistant.market_summary(location).await?;

    println!("{}", answer.text);
    print_sources(&answer.sources);
    Ok(())
}

fn build_assistant() -> anyhow::Result<Assistant> {
    let config = Config::load()?;
    let api_key = config
        .api_key
        .ok_or_else(|| anyhow::anyhow!("no API key configured (set AGRIVOICE_API_KEY)"))?;

    Ok(Assistant::new(
        api_key,
        config.base_url,
        config.chat_model,
        config.chat_instruction,
    ))
}

fn print_sources(sources: &[agrivoice::GroundingSource]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for source in sources {
        println!("  - {} <{}>", source.title, source.uri);
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, save: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut mic = MicSource::open()?;
    let (tx, mut rx) = mpsc::channel(32);
    mic.attach(tx)?;

    println!("Sample rate: {} Hz", codec::INPUT_SAMPLE_RATE);
    println!("---");

    let mut captured: Vec<f32> = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    let mut second = 0u64;

    loop {
        tokio::select! {
            Some(chunk) = rx.recv() => {
                let bytes = codec::decode_base64(&chunk.data)?;
                let mut channels = codec::f32_from_pcm16(&bytes, 1)?;
                captured.append(&mut channels[0]);
            }
            _ = ticker.tick() => {
                second += 1;
                #[allow(clippy::cast_possible_truncation)]
                let window_len = codec::INPUT_SAMPLE_RATE as usize;
                let window = &captured[captured.len().saturating_sub(window_len)..];
                let energy = calculate_rms(window);
                let peak = window.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

                // Visual meter
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let meter_len = (energy * 100.0).min(50.0) as usize;
                let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

                println!("[{second:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");

                if tokio::time::Instant::now() >= deadline {
                    break;
                }
            }
        }
    }

    mic.detach();

    if let Some(path) = save {
        let wav = codec::samples_to_wav(&captured, codec::INPUT_SAMPLE_RATE)?;
        std::fs::write(path, wav)?;
        println!("\nSaved {} samples to {}", captured.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave through the playback scheduler
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let (sink, clock) = DeviceOut::open()?;
    let mut scheduler = PlaybackScheduler::new(sink, clock);

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (f64::from(OUTPUT_SAMPLE_RATE) * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / OUTPUT_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {num_samples} samples at {OUTPUT_SAMPLE_RATE} Hz...");
    scheduler.schedule(samples, duration_secs)?;

    tokio::time::sleep(Duration::from_secs_f64(duration_secs + 0.5)).await;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
