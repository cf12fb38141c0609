mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use airsync_audio::{CaptureSource, NullPlayback, PcmFileCapture, PcmFilePlayback, PlaybackSink, ToneCapture};
use airsync_clock::{Clock, MonotonicClock};
use airsync_sink::{SinkSession, WsSinkTransport};
use cli::{CaptureDevice, Cli, Commands, PlaybackDevice};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!("airsync={level}")))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Info => run_info(),
        Commands::Devices => run_devices(),
        Commands::Server { bind, capture, tone_frames } => run_server(bind, capture, tone_frames).await,
        Commands::Client { server, playback, client_id } => run_client(server, playback, client_id).await,
    }
}

fn run_info() -> Result<()> {
    let config = airsync_config::dump();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn run_devices() -> Result<()> {
    println!("capture devices:");
    println!("  tone         synthetic sine-wave test signal");
    println!("  <path>       raw PCM file, read as the session format");
    println!("playback devices:");
    println!("  null         discard audio, count bytes only");
    println!("  <path>       raw PCM file, written as the session format");
    Ok(())
}

async fn run_server(bind: Option<String>, capture_spec: String, tone_frames: u32) -> Result<()> {
    let bind = bind.unwrap_or_else(|| format!("0.0.0.0:{}", airsync_config::DEFAULT_PORT));
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());

    let capture: Box<dyn CaptureSource> = match CaptureDevice::parse(&capture_spec) {
        CaptureDevice::Tone => Box::new(ToneCapture::new(
            airsync_config::BYTES_PER_FRAME,
            airsync_config::SAMPLE_RATE,
            440.0,
            tone_frames,
        )),
        CaptureDevice::PcmFile(path) => Box::new(
            PcmFileCapture::open(&path, airsync_config::BYTES_PER_FRAME)
                .await
                .with_context(|| format!("opening capture file {}", path.display()))?,
        ),
    };

    tracing::info!(%bind, capture = %capture_spec, "starting airsync source");
    airsync_source::run(&bind, capture, clock).await.context("source node failed")
}

async fn run_client(server: String, playback_spec: String, client_id: String) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let transport = WsSinkTransport::connect(&server).await.with_context(|| format!("connecting to {server}"))?;

    let playback: Box<dyn PlaybackSink> = match PlaybackDevice::parse(&playback_spec) {
        PlaybackDevice::Null => Box::new(NullPlayback::default()),
        PlaybackDevice::PcmFile(path) => Box::new(
            PcmFilePlayback::create(&path)
                .await
                .with_context(|| format!("creating playback file {}", path.display()))?,
        ),
    };

    tracing::info!(%server, playback = %playback_spec, "connected to source");
    let mut session = SinkSession::new(
        Box::new(transport),
        playback,
        clock,
        client_id,
        airsync_config::MAX_BUFFER_MS,
    );
    session.run().await.context("sink session failed")?;
    Ok(())
}
