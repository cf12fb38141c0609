//! The sink-side jitter buffer: an ordered, bounded window of future-dated
//! audio frames.
//!
//! Frames are kept sorted by `play_at_local` ascending (ties break by
//! `sequence`) and inserted by binary search rather than appended in
//! arrival order, because the transport is only ordered in the common
//! case — reconnection or a web sink's own decode queue can still
//! reorder, and this buffer has to behave correctly either way.

use std::collections::VecDeque;

/// One decoded frame plus the local time at which it must be handed to
/// the playback shim.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedFrame {
    pub sequence: u32,
    pub play_at_local: f64,
    pub data: Vec<u8>,
}

/// What happened to a frame offered to [`JitterBuffer::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// `play_at_local` was already in the past at insertion time.
    LateDropped,
}

/// Ordered, size-bounded container of frames awaiting playout, plus the
/// running counters the sink reports as stats.
pub struct JitterBuffer {
    frames: VecDeque<BufferedFrame>,
    max_buffer_ms: f64,
    last_seq: Option<u32>,
    dropped: u64,
    late: u64,
}

impl JitterBuffer {
    pub fn new(max_buffer_ms: f64) -> Self {
        Self {
            frames: VecDeque::new(),
            max_buffer_ms,
            last_seq: None,
            dropped: 0,
            late: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn late(&self) -> u64 {
        self.late
    }

    pub fn last_sequence(&self) -> Option<u32> {
        self.last_seq
    }

    /// Offers one incoming frame to the buffer, enforcing the invariants
    /// in order: sequence-gap accounting, late-drop, sorted insertion,
    /// then overflow trim from the front.
    pub fn insert(&mut self, sequence: u32, play_at_local: f64, data: Vec<u8>, local_now: f64) -> InsertOutcome {
        // 1. Sequence-gap accounting — unconditional, even for frames we
        // go on to drop as late.
        if let Some(last) = self.last_seq {
            if sequence != last.wrapping_add(1) && sequence > last {
                self.dropped += (sequence - last - 1) as u64;
            }
        }
        self.last_seq = Some(sequence);

        // 2. Late-drop.
        if play_at_local < local_now {
            self.late += 1;
            if self.late % 100 == 0 {
                tracing::warn!(late_total = self.late, sequence, "jitter buffer: late frame dropped");
            }
            return InsertOutcome::LateDropped;
        }

        // 3. Sorted insertion by play_at_local, ties by sequence.
        let pos = self
            .frames
            .iter()
            .position(|f| (f.play_at_local, f.sequence) > (play_at_local, sequence))
            .unwrap_or(self.frames.len());
        self.frames.insert(pos, BufferedFrame { sequence, play_at_local, data });

        // 4. Overflow trim: drop from the front, newest data is most
        // valuable.
        while let (Some(first), Some(last)) = (self.frames.front(), self.frames.back()) {
            if last.play_at_local - first.play_at_local <= self.max_buffer_ms {
                break;
            }
            self.frames.pop_front();
            self.dropped += 1;
        }

        InsertOutcome::Inserted
    }

    /// Drains every frame whose deadline has arrived, in playout order.
    pub fn drain_ready(&mut self, local_now: f64) -> Vec<BufferedFrame> {
        let mut ready = Vec::new();
        while let Some(front) = self.frames.front() {
            if front.play_at_local > local_now {
                break;
            }
            ready.push(self.frames.pop_front().unwrap());
        }
        ready
    }
}
