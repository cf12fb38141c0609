//! Byte-stream re-chunking and the capture/playback trait boundary.

mod framer;
mod shim;

pub use framer::Framer;
pub use shim::{CaptureSource, NullPlayback, PcmFileCapture, PcmFilePlayback, PlaybackSink, ToneCapture};
