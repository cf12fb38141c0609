//! Top-level argument parsing for the `airsync` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "airsync")]
#[command(about = "Synchronized multi-room PCM audio streaming")]
pub struct Cli {
    /// Enable debug-level logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the source node: accept sink connections and stream audio
    Server {
        /// Address to bind, e.g. 0.0.0.0:8765
        #[arg(long)]
        bind: Option<String>,

        /// Capture device: "tone" for a synthetic test tone, or a path to
        /// a raw PCM file
        #[arg(long, default_value = "tone")]
        capture: String,

        /// Number of frames to emit before stopping, when capturing from
        /// the synthetic tone device
        #[arg(long, default_value_t = 500)]
        tone_frames: u32,
    },

    /// Run a sink: connect to a source and play the stream out
    Client {
        /// Source URL, e.g. ws://127.0.0.1:8765/ws
        #[arg(long)]
        server: String,

        /// Playback device: "null" to discard audio, or a path to write
        /// raw PCM to
        #[arg(long, default_value = "null")]
        playback: String,

        /// Identifier this sink reports in its client_ready message
        #[arg(long, default_value = "airsync-client")]
        client_id: String,
    },

    /// List the capture/playback device identifiers this build supports
    Devices,

    /// Print the compiled-in session configuration as JSON
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureDevice {
    Tone,
    PcmFile(PathBuf),
}

impl CaptureDevice {
    pub fn parse(spec: &str) -> Self {
        if spec == "tone" {
            CaptureDevice::Tone
        } else {
            CaptureDevice::PcmFile(PathBuf::from(spec))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackDevice {
    Null,
    PcmFile(PathBuf),
}

impl PlaybackDevice {
    pub fn parse(spec: &str) -> Self {
        if spec == "null" {
            PlaybackDevice::Null
        } else {
            PlaybackDevice::PcmFile(PathBuf::from(spec))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn server_defaults() {
        let cli = Cli::parse_from(["airsync", "server"]);
        match cli.command {
            Commands::Server { bind, capture, tone_frames } => {
                assert_eq!(bind, None);
                assert_eq!(capture, "tone");
                assert_eq!(tone_frames, 500);
            }
            _ => panic!("expected Server"),
        }
    }

    #[test]
    fn capture_device_parses_tone_and_path() {
        assert_eq!(CaptureDevice::parse("tone"), CaptureDevice::Tone);
        assert_eq!(CaptureDevice::parse("in.pcm"), CaptureDevice::PcmFile(PathBuf::from("in.pcm")));
    }
}
