//! Re-chunks an arbitrary byte stream into fixed-size PCM frames.
//!
//! The framer is deliberately dumb: it knows nothing about sample rates
//! or channel counts, only a chunk size in bytes. Callers push whatever
//! a capture shim hands them and drain ready-made frames; a trailing
//! partial frame at end of stream is returned as-is by [`Framer::flush`].

/// Holds at most one partially-filled internal buffer. Staying within
/// `2 × chunk_size` requires callers to push reads no larger than
/// `chunk_size` at a time — every capture shim in this crate does.
pub struct Framer {
    chunk_size: usize,
    pending: Vec<u8>,
}

impl Framer {
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be positive");
        Self {
            chunk_size,
            pending: Vec::with_capacity(chunk_size * 2),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Appends bytes and returns every full-size frame that can now be
    /// carved off, in stream order. Any remainder stays buffered.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let frame = self.pending.drain(..self.chunk_size).collect();
            out.push(frame);
        }
        out
    }

    /// Called once the upstream byte stream has ended. Returns the
    /// trailing partial frame, if any bytes remain.
    pub fn flush(self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending)
        }
    }
}
