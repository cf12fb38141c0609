//! Compile-time tuning parameters shared by the source and every sink.
//!
//! This is a global config object in the sense the design notes describe
//! it: an immutable record with no mutation path. Unlike `pmoconfig`
//! (which loads a mutable YAML document behind a `lazy_static` singleton)
//! there is nothing here to load or override at runtime — every value is
//! a `const`, and `Config::dump()` only exists to hand the same table to
//! the `info` CLI subcommand or a log line.

use serde::Serialize;

/// Samples per channel per frame, derived from [`SAMPLE_RATE`] and
/// [`CHUNK_DURATION_MS`].
pub const SAMPLES_PER_FRAME: usize =
    (SAMPLE_RATE as usize * CHUNK_DURATION_MS as usize) / 1000;

/// Bytes per frame for the fixed S16LE stereo format:
/// `samplesPerFrame * channels * (bitDepth / 8)`.
pub const BYTES_PER_FRAME: usize =
    SAMPLES_PER_FRAME * CHANNELS as usize * (BIT_DEPTH as usize / 8);

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;
pub const BIT_DEPTH: u32 = 16;
pub const CHUNK_DURATION_MS: u32 = 20;

pub const DEFAULT_PORT: u16 = 8765;

pub const SYNC_INTERVAL_MS: u64 = 1_000;
pub const SYNC_SAMPLES: usize = 5;

pub const TARGET_BUFFER_MS: f64 = 60.0;
pub const MIN_BUFFER_MS: f64 = 30.0;
pub const MAX_BUFFER_MS: f64 = 200.0;
pub const MAX_DRIFT_MS: f64 = 5.0;

/// The playout loop's poll period: `max(1ms, floor(chunkDurationMs / 4))`.
pub const PLAYOUT_POLL_MS: u64 = {
    let quarter = CHUNK_DURATION_MS as u64 / 4;
    if quarter < 1 { 1 } else { quarter }
};

/// Short delay used right after a frame is dispatched, to allow
/// back-to-back drains without waiting a full poll period.
pub const PLAYOUT_FAST_POLL_MS: u64 = 1;

/// The fixed PCM parameters a session announces and every sink must
/// match exactly. Carrying this as its own type (rather than five loose
/// constants) is what lets `ProtocolMismatch` be a single field
/// comparison at the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub chunk_duration_ms: u32,
}

impl PcmFormat {
    pub const fn session_default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bit_depth: BIT_DEPTH,
            chunk_duration_ms: CHUNK_DURATION_MS,
        }
    }

    pub const fn bytes_per_frame(&self) -> usize {
        let samples_per_frame = (self.sample_rate as usize * self.chunk_duration_ms as usize) / 1000;
        samples_per_frame * self.channels as usize * (self.bit_depth as usize / 8)
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::session_default()
    }
}

/// Snapshot of every tuning constant, for the `info` CLI subcommand and
/// for logging at startup.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Config {
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub chunk_duration_ms: u32,
    pub default_port: u16,
    pub sync_interval_ms: u64,
    pub sync_samples: usize,
    pub target_buffer_ms: f64,
    pub min_buffer_ms: f64,
    pub max_buffer_ms: f64,
    pub max_drift_ms: f64,
    pub samples_per_frame: usize,
    pub bytes_per_frame: usize,
}

/// Returns the one and only configuration. There is no setter: every
/// field is a compile-time constant, so this always returns the same
/// value — it exists purely to give the table a single call site.
pub fn dump() -> Config {
    Config {
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        bit_depth: BIT_DEPTH,
        chunk_duration_ms: CHUNK_DURATION_MS,
        default_port: DEFAULT_PORT,
        sync_interval_ms: SYNC_INTERVAL_MS,
        sync_samples: SYNC_SAMPLES,
        target_buffer_ms: TARGET_BUFFER_MS,
        min_buffer_ms: MIN_BUFFER_MS,
        max_buffer_ms: MAX_BUFFER_MS,
        max_drift_ms: MAX_DRIFT_MS,
        samples_per_frame: SAMPLES_PER_FRAME,
        bytes_per_frame: BYTES_PER_FRAME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_sizes_match_spec_literals() {
        assert_eq!(SAMPLES_PER_FRAME, 960);
        assert_eq!(BYTES_PER_FRAME, 3840);
    }

    #[test]
    fn pcm_format_default_matches_session_constants() {
        let fmt = PcmFormat::default();
        assert_eq!(fmt.sample_rate, SAMPLE_RATE);
        assert_eq!(fmt.bytes_per_frame(), BYTES_PER_FRAME);
    }

    #[test]
    fn dump_is_stable_across_calls() {
        let a = dump();
        let b = dump();
        assert_eq!(a.bytes_per_frame, b.bytes_per_frame);
        assert_eq!(a.default_port, DEFAULT_PORT);
    }
}
