//! External interfaces: platform audio capture and playback.
//!
//! The real collaborators here — an OS-specific loopback capture device,
//! a platform audio output — are out of scope; this crate only owns the
//! trait boundary plus implementations plain enough to exercise the
//! pipeline without any platform audio stack, the way `pmoaudio` ships
//! `FileSource`/`FlacFileSink` alongside its real device/network sinks.

use async_trait::async_trait;
use std::f64::consts::PI;
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Consumes a device identifier string, produces an append-only byte
/// stream of PCM samples in the session format. Errors terminate
/// streaming; a partial frame at end of stream is still delivered (the
/// [`crate::Framer`] upstream of this trait handles that).
#[async_trait]
pub trait CaptureSource: Send {
    /// Returns the next chunk of raw bytes, or `None` once the stream
    /// is exhausted.
    async fn next_bytes(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Accepts a stream of byte blocks conforming to the session PCM
/// format. Writes must not reorder; a real implementation may coalesce
/// blocks internally, but every byte handed to `write_chunk` must reach
/// the output in the order it was given.
#[async_trait]
pub trait PlaybackSink: Send {
    async fn write_chunk(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Synthetic sine-wave capture: S16LE stereo samples at the given
/// sample rate. Generates a fixed number of frames of `frame_bytes`
/// length and then reports end of stream, which is exactly the
/// `SourceNode::generate_chunks` demo pattern used for multiroom testing.
pub struct ToneCapture {
    frame_bytes: usize,
    sample_rate: u32,
    frequency_hz: f64,
    frames_remaining: u32,
    phase: f64,
}

impl ToneCapture {
    pub fn new(frame_bytes: usize, sample_rate: u32, frequency_hz: f64, frame_count: u32) -> Self {
        Self {
            frame_bytes,
            sample_rate,
            frequency_hz,
            frames_remaining: frame_count,
            phase: 0.0,
        }
    }
}

#[async_trait]
impl CaptureSource for ToneCapture {
    async fn next_bytes(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.frames_remaining == 0 {
            return Ok(None);
        }
        self.frames_remaining -= 1;

        let samples_per_frame = self.frame_bytes / 4; // stereo i16: 4 bytes/sample-pair
        let mut out = Vec::with_capacity(self.frame_bytes);
        let step = 2.0 * PI * self.frequency_hz / self.sample_rate as f64;
        for _ in 0..samples_per_frame {
            let value = (self.phase.sin() * i16::MAX as f64 * 0.25) as i16;
            out.extend_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
            self.phase += step;
        }
        Ok(Some(out))
    }
}

/// Reads raw interleaved S16LE PCM bytes out of a file, `read_size`
/// bytes at a time. No container (WAV/FLAC) header is parsed — the file
/// is expected to already be raw samples in the session format, the
/// same assumption `pmoaudio`'s `disk_sink` makes in reverse for its
/// write side.
pub struct PcmFileCapture {
    file: File,
    read_size: usize,
}

impl PcmFileCapture {
    pub async fn open(path: impl AsRef<Path>, read_size: usize) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self { file, read_size })
    }
}

#[async_trait]
impl CaptureSource for PcmFileCapture {
    async fn next_bytes(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.read_size];
        let mut total_read = 0usize;
        while total_read < buf.len() {
            let n = self.file.read(&mut buf[total_read..]).await?;
            if n == 0 {
                break;
            }
            total_read += n;
        }
        if total_read == 0 {
            return Ok(None);
        }
        buf.truncate(total_read);
        Ok(Some(buf))
    }
}

/// Discards audio, counting bytes written. Used in tests and headless
/// operation where there is nothing to actually play through.
#[derive(Debug, Default)]
pub struct NullPlayback {
    pub bytes_written: u64,
}

#[async_trait]
impl PlaybackSink for NullPlayback {
    async fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.bytes_written += data.len() as u64;
        Ok(())
    }
}

/// Appends every received chunk to a file, in arrival order — a minimal
/// stand-in for a platform output device, good enough to diff against a
/// source recording in a test.
pub struct PcmFilePlayback {
    file: File,
}

impl PcmFilePlayback {
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path).await?;
        Ok(Self { file })
    }
}

#[async_trait]
impl PlaybackSink for PcmFilePlayback {
    async fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await
    }
}
