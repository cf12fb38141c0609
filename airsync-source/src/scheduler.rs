//! The source's sink table and scheduling state: who is connected, who
//! has converged its clock and is ready for audio, and the one place a
//! captured frame gets stamped and fanned out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use airsync_clock::Clock;
use airsync_protocol::{encode, AudioChunkMsg, Message, ServerInfo, SyncRequest, SyncResponse};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub type SinkId = Uuid;

/// `Idle` before the listener has bound, `Listening` once it is accepting
/// connections, `Streaming` once the capture loop has sent its first
/// frame. Purely observational — nothing in the scheduler gates on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Listening,
    Streaming,
}

struct SinkRecord {
    outbound: mpsc::Sender<Vec<u8>>,
    ready: bool,
    client_id: Option<String>,
    send_failures: u32,
}

/// Outbound channel capacity per sink. One second of audio at the
/// session chunk duration, generous enough to absorb a brief stall
/// without the scheduler's broadcast blocking on a slow sink.
const SINK_CHANNEL_CAPACITY: usize = 1_000 / airsync_config::CHUNK_DURATION_MS as usize;

/// Consecutive `try_send` failures tolerated before a sink is dropped.
/// A single `Full` is transient backpressure on a briefly busy sink; a
/// run of them means it is no longer draining at all.
const SEND_FAILURE_THRESHOLD: u32 = 5;

pub struct SourceScheduler {
    clock: Arc<dyn Clock>,
    sinks: RwLock<HashMap<SinkId, SinkRecord>>,
    state: StdRwLock<SourceState>,
    sequence: AtomicU32,
    start_time: f64,
}

impl SourceScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let start_time = clock.now_ms();
        Self {
            clock,
            sinks: RwLock::new(HashMap::new()),
            state: StdRwLock::new(SourceState::Idle),
            sequence: AtomicU32::new(0),
            start_time,
        }
    }

    pub fn state(&self) -> SourceState {
        *self.state.read().unwrap()
    }

    pub fn set_state(&self, state: SourceState) {
        *self.state.write().unwrap() = state;
    }

    pub fn server_info(&self) -> ServerInfo {
        let fmt = airsync_config::PcmFormat::session_default();
        ServerInfo {
            sample_rate: fmt.sample_rate,
            channels: fmt.channels,
            bit_depth: fmt.bit_depth,
            chunk_duration_ms: fmt.chunk_duration_ms,
            server_start_time: self.start_time,
        }
    }

    /// Registers a newly connected sink and returns its id plus the
    /// receiving half of its outbound channel, which the connection's
    /// egress task drains to the wire.
    pub async fn register_sink(&self) -> (SinkId, mpsc::Receiver<Vec<u8>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SINK_CHANNEL_CAPACITY.max(1));
        self.sinks
            .write()
            .await
            .insert(id, SinkRecord { outbound: tx, ready: false, client_id: None, send_failures: 0 });
        (id, rx)
    }

    pub async fn unregister_sink(&self, id: SinkId) {
        self.sinks.write().await.remove(&id);
    }

    pub async fn mark_ready(&self, id: SinkId, client_id: String) {
        if let Some(record) = self.sinks.write().await.get_mut(&id) {
            record.ready = true;
            record.client_id = Some(client_id);
        }
    }

    pub async fn sink_count(&self) -> usize {
        self.sinks.read().await.len()
    }

    pub async fn ready_sink_count(&self) -> usize {
        self.sinks.read().await.values().filter(|r| r.ready).count()
    }

    /// Builds the reply to one `sync_request`: `t2` stamped on receipt,
    /// `t3` stamped immediately before the caller sends it. The source
    /// answers this before reading the connection's next inbound message,
    /// so no other work can land between the two stamps in practice.
    pub fn build_sync_response(&self, req: &SyncRequest) -> SyncResponse {
        let t2 = self.clock.now_ms();
        let t3 = self.clock.now_ms();
        SyncResponse { t1: req.t1, t2, t3 }
    }

    /// Sends one encoded message directly to a single sink's outbound
    /// channel — used for `sync_response` and `error` replies that must
    /// not wait behind the broadcast path.
    pub async fn send_to(&self, id: SinkId, msg: &Message) {
        let encoded = encode(msg);
        let sinks = self.sinks.read().await;
        if let Some(record) = sinks.get(&id) {
            // A full or closed channel here means the connection is
            // already dying; the egress task's own error handling will
            // unregister it, so a dropped reply is harmless.
            let _ = record.outbound.try_send(encoded);
        }
    }

    /// Stamps one captured frame with the next sequence number and the
    /// current source clock, then fans it out to every sink that has
    /// reached `client_ready`. A `send_failure` is transient and only
    /// counted and logged; a sink is dropped from the table once its
    /// consecutive failure count reaches [`SEND_FAILURE_THRESHOLD`], so one
    /// repeatedly stalled sink never blocks the others.
    pub async fn broadcast_frame(&self, data: Vec<u8>) {
        let timestamp = self.clock.now_ms();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let encoded = encode(&Message::AudioChunk(AudioChunkMsg { timestamp, sequence, data }));

        let mut dead = Vec::new();
        {
            let mut sinks = self.sinks.write().await;
            for (id, record) in sinks.iter_mut() {
                if !record.ready {
                    continue;
                }
                match record.outbound.try_send(encoded.clone()) {
                    Ok(()) => record.send_failures = 0,
                    Err(_) => {
                        record.send_failures += 1;
                        tracing::warn!(sink = %id, failures = record.send_failures, "send_failure: outbound channel full or closed");
                        if record.send_failures >= SEND_FAILURE_THRESHOLD {
                            dead.push(*id);
                        }
                    }
                }
            }
            for id in &dead {
                tracing::warn!(sink = %id, "dropping sink after repeated send failures");
                sinks.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airsync_clock::MonotonicClock;

    fn scheduler() -> SourceScheduler {
        SourceScheduler::new(Arc::new(MonotonicClock::new()))
    }

    #[tokio::test]
    async fn unready_sink_receives_no_broadcast() {
        let sched = scheduler();
        let (_id, mut rx) = sched.register_sink().await;
        sched.broadcast_frame(vec![1, 2, 3]).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ready_sink_receives_broadcast_frame() {
        let sched = scheduler();
        let (id, mut rx) = sched.register_sink().await;
        sched.mark_ready(id, "client-a".to_string()).await;
        sched.broadcast_frame(vec![9, 9, 9]).await;
        let bytes = rx.try_recv().unwrap();
        match airsync_protocol::decode(&bytes).unwrap() {
            Message::AudioChunk(chunk) => {
                assert_eq!(chunk.data, vec![9, 9, 9]);
                assert_eq!(chunk.sequence, 0);
            }
            other => panic!("expected audio_chunk, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sequence_increments_across_broadcasts() {
        let sched = scheduler();
        let (id, mut rx) = sched.register_sink().await;
        sched.mark_ready(id, "c".to_string()).await;
        sched.broadcast_frame(vec![0]).await;
        sched.broadcast_frame(vec![1]).await;
        let seqs: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|b| match airsync_protocol::decode(&b).unwrap() {
                Message::AudioChunk(c) => c.sequence,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[tokio::test]
    async fn unregister_removes_from_broadcast() {
        let sched = scheduler();
        let (id, _rx) = sched.register_sink().await;
        sched.mark_ready(id, "c".to_string()).await;
        sched.unregister_sink(id).await;
        assert_eq!(sched.ready_sink_count().await, 0);
    }

    #[tokio::test]
    async fn transient_send_failure_does_not_evict_a_backlogged_sink() {
        let sched = scheduler();
        let (id, _rx) = sched.register_sink().await;
        sched.mark_ready(id, "c".to_string()).await;

        for i in 0..SINK_CHANNEL_CAPACITY {
            sched.broadcast_frame(vec![i as u8]).await;
        }
        assert_eq!(sched.ready_sink_count().await, 1);

        // One failure beyond capacity is transient backpressure, not a
        // reason to disconnect a healthy-but-backlogged sink.
        sched.broadcast_frame(vec![0]).await;
        assert_eq!(sched.ready_sink_count().await, 1);
    }

    #[tokio::test]
    async fn repeated_send_failures_evict_the_sink() {
        let sched = scheduler();
        let (id, _rx) = sched.register_sink().await;
        sched.mark_ready(id, "c".to_string()).await;

        for i in 0..SINK_CHANNEL_CAPACITY {
            sched.broadcast_frame(vec![i as u8]).await;
        }
        for _ in 0..SEND_FAILURE_THRESHOLD {
            sched.broadcast_frame(vec![0]).await;
        }
        assert_eq!(sched.ready_sink_count().await, 0);
    }

    #[tokio::test]
    async fn late_joining_sink_never_sees_a_rewound_sequence() {
        let sched = scheduler();

        // The source has been streaming to no one for a while before this
        // sink connects — the sequence counter is global, not per-sink.
        for _ in 0..5000 {
            sched.broadcast_frame(vec![0]).await;
        }

        let (id, mut rx) = sched.register_sink().await;
        sched.mark_ready(id, "late".to_string()).await;
        sched.broadcast_frame(vec![1]).await;
        sched.broadcast_frame(vec![2]).await;

        let first = match airsync_protocol::decode(&rx.try_recv().unwrap()).unwrap() {
            Message::AudioChunk(chunk) => chunk.sequence,
            other => panic!("expected audio_chunk, got {:?}", other),
        };
        let second = match airsync_protocol::decode(&rx.try_recv().unwrap()).unwrap() {
            Message::AudioChunk(chunk) => chunk.sequence,
            other => panic!("expected audio_chunk, got {:?}", other),
        };

        assert!(first >= 5001, "expected first frame seen by a late sink to be past what was already streamed");
        assert!(second > first, "sequence must stay monotone for a newly joined sink");
    }

    #[tokio::test]
    async fn sync_response_echoes_requests_t1() {
        let sched = scheduler();
        let resp = sched.build_sync_response(&SyncRequest { t1: 42.0 });
        assert_eq!(resp.t1, 42.0);
        assert!(resp.t3 >= resp.t2);
    }
}
