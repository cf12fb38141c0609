//! The sink's half of one source connection: handshake, continuous clock
//! sync, and the playout loop, all driven off a [`SinkTransport`] so the
//! whole state machine runs the same way against a real WebSocket or the
//! in-memory [`crate::transport::duplex`] pair.

use std::sync::Arc;
use std::time::Duration;

use airsync_clock::Clock;
use airsync_config::{PcmFormat, PLAYOUT_FAST_POLL_MS, PLAYOUT_POLL_MS, SYNC_INTERVAL_MS, TARGET_BUFFER_MS};
use airsync_protocol::{decode, encode, ClientReady, Message, ServerInfo, SyncRequest};
use airsync_sync::{sample_from_exchange, SyncEstimator};

use crate::error::SinkError;
use crate::jitter_buffer::JitterBuffer;
use crate::transport::SinkTransport;

/// Where a session is in its lifecycle. `Ready` and `Playing` also gate
/// the playout loop itself: dispatch to the playback sink only happens
/// once the buffer has banked enough frames to flip into `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Dialing,
    DescriptorPending,
    Syncing,
    Ready,
    Playing,
    Closed,
}

/// Counters surfaced for diagnostics: nothing here feeds back into
/// playout decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkStats {
    pub frames_played: u64,
    pub sync_exchanges: u64,
}

/// Drives one sink-side session to completion. Generic over nothing —
/// the transport, clock, and playback sink are all trait objects, since
/// a session is a long-lived, singly-owned state machine rather than a
/// type callers need to monomorphize over.
pub struct SinkSession {
    transport: Box<dyn SinkTransport>,
    playback: Box<dyn airsync_audio::PlaybackSink>,
    clock: Arc<dyn Clock>,
    client_id: String,
    supported_format: PcmFormat,
    estimator: SyncEstimator,
    buffer: JitterBuffer,
    state: SessionState,
    stats: SinkStats,
}

impl SinkSession {
    pub fn new(
        transport: Box<dyn SinkTransport>,
        playback: Box<dyn airsync_audio::PlaybackSink>,
        clock: Arc<dyn Clock>,
        client_id: String,
        max_buffer_ms: f64,
    ) -> Self {
        Self {
            transport,
            playback,
            clock,
            client_id,
            supported_format: PcmFormat::session_default(),
            estimator: SyncEstimator::new(),
            buffer: JitterBuffer::new(max_buffer_ms),
            state: SessionState::Dialing,
            stats: SinkStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    pub fn estimator(&self) -> &SyncEstimator {
        &self.estimator
    }

    async fn recv_message(&mut self) -> Result<Message, SinkError> {
        match self.transport.recv().await? {
            None => Err(SinkError::ClosedEarly("message")),
            Some(bytes) => Ok(decode(&bytes)?),
        }
    }

    async fn send_message(&mut self, msg: &Message) -> Result<(), SinkError> {
        self.transport.send(encode(msg)).await?;
        Ok(())
    }

    /// Sends `sync_request` with `t1 = now` and blocks for the matching
    /// `sync_response`, folding the derived sample into the estimator.
    /// The source answers a sync request from the same per-sink outbound
    /// channel the capture loop broadcasts `audio_chunk` into, from two
    /// independent tasks, so an `audio_chunk` can land ahead of the
    /// `sync_response` it raced with. Anything that isn't the response is
    /// handled the same way the playout loop handles it and the wait
    /// continues — only a transport error or a message `handle_inbound`
    /// itself rejects ends the exchange early.
    async fn exchange_sync(&mut self) -> Result<(), SinkError> {
        let t1 = self.clock.now_ms();
        self.send_message(&Message::SyncRequest(SyncRequest { t1 })).await?;
        loop {
            match self.recv_message().await? {
                Message::SyncResponse(resp) => {
                    let t4 = self.clock.now_ms();
                    let sample = sample_from_exchange(resp.t1, resp.t2, resp.t3, t4);
                    self.estimator.accept(sample);
                    self.stats.sync_exchanges += 1;
                    return Ok(());
                }
                other => self.handle_inbound(other)?,
            }
        }
    }

    /// Runs the full session: handshake, initial sync, then the combined
    /// receive/resync/playout loop until the transport closes.
    pub async fn run(&mut self) -> Result<(), SinkError> {
        self.state = SessionState::DescriptorPending;
        let info = match self.recv_message().await? {
            Message::ServerInfo(info) => info,
            other => return Err(SinkError::UnexpectedMessage { expected: "server_info", got: other.tag() }),
        };
        self.check_format(info)?;

        self.state = SessionState::Syncing;
        self.exchange_sync().await?;

        self.state = SessionState::Ready;
        self.send_message(&Message::ClientReady(ClientReady { client_id: self.client_id.clone() })).await?;

        self.playout_loop().await?;

        self.state = SessionState::Closed;
        Ok(())
    }

    fn check_format(&self, announced: ServerInfo) -> Result<(), SinkError> {
        let announced_format = PcmFormat {
            sample_rate: announced.sample_rate,
            channels: announced.channels,
            bit_depth: announced.bit_depth,
            chunk_duration_ms: announced.chunk_duration_ms,
        };
        if announced_format != self.supported_format {
            return Err(SinkError::FormatMismatch {
                announced: announced_format,
                supported: self.supported_format,
            });
        }
        Ok(())
    }

    async fn playout_loop(&mut self) -> Result<(), SinkError> {
        let mut sync_timer = tokio::time::interval(Duration::from_millis(SYNC_INTERVAL_MS));
        sync_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; we've already synced once above.
        sync_timer.tick().await;

        let mut poll_delay_ms = PLAYOUT_POLL_MS;

        loop {
            let sleep = tokio::time::sleep(Duration::from_millis(poll_delay_ms));
            tokio::pin!(sleep);

            tokio::select! {
                msg = self.transport.recv() => {
                    match msg? {
                        None => return Ok(()),
                        Some(bytes) => self.handle_inbound(decode(&bytes)?)?,
                    }
                    // Ready -> Playing once the buffer has banked enough
                    // frames to absorb jitter; the playback shim itself was
                    // already acquired back when the session was built.
                    if self.state == SessionState::Ready && self.buffer.len() >= 2 {
                        self.state = SessionState::Playing;
                    }
                }
                _ = sync_timer.tick() => {
                    self.exchange_sync().await?;
                }
                _ = &mut sleep => {
                    if self.state != SessionState::Playing {
                        poll_delay_ms = PLAYOUT_POLL_MS;
                    } else {
                        let now = self.clock.now_ms();
                        let ready = self.buffer.drain_ready(now);
                        if ready.is_empty() {
                            poll_delay_ms = PLAYOUT_POLL_MS;
                        } else {
                            for frame in ready {
                                self.playback.write_chunk(&frame.data).await.map_err(SinkError::Playback)?;
                                self.stats.frames_played += 1;
                            }
                            poll_delay_ms = PLAYOUT_FAST_POLL_MS;
                        }
                    }
                }
            }
        }
    }

    fn handle_inbound(&mut self, msg: Message) -> Result<(), SinkError> {
        match msg {
            Message::AudioChunk(chunk) => {
                let play_at_local = self.estimator.source_to_local(chunk.timestamp) + TARGET_BUFFER_MS;
                let now = self.clock.now_ms();
                self.buffer.insert(chunk.sequence, play_at_local, chunk.data, now);
                Ok(())
            }
            Message::Error(e) => {
                tracing::warn!(message = %e.message, "source reported an error");
                Ok(())
            }
            Message::SyncResponse(_) => {
                // A response that arrives after exchange_sync already
                // matched its request — stale, harmless to ignore.
                Ok(())
            }
            other => Err(SinkError::UnexpectedMessage { expected: "audio_chunk or error", got: other.tag() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::duplex;
    use airsync_audio::NullPlayback;
    use airsync_clock::MonotonicClock;
    use airsync_protocol::{AudioChunkMsg, SyncResponse};

    fn server_info() -> ServerInfo {
        let fmt = PcmFormat::session_default();
        ServerInfo {
            sample_rate: fmt.sample_rate,
            channels: fmt.channels,
            bit_depth: fmt.bit_depth,
            chunk_duration_ms: fmt.chunk_duration_ms,
            server_start_time: 0.0,
        }
    }

    #[tokio::test]
    async fn handshake_then_first_frame_reaches_playback() {
        let (sink_transport, mut server_transport) = duplex::pair(16);
        let mut session = SinkSession::new(
            Box::new(sink_transport),
            Box::new(NullPlayback::default()),
            Arc::new(MonotonicClock::new()),
            "test-client".to_string(),
            200.0,
        );

        let server = tokio::spawn(async move {
            server_transport.send(encode(&Message::ServerInfo(server_info()))).await.unwrap();

            let bytes = server_transport.recv().await.unwrap().unwrap();
            let req = match decode(&bytes).unwrap() {
                Message::SyncRequest(r) => r,
                other => panic!("expected sync_request, got {:?}", other),
            };
            server_transport
                .send(encode(&Message::SyncResponse(SyncResponse { t1: req.t1, t2: req.t1, t3: req.t1 })))
                .await
                .unwrap();

            let bytes = server_transport.recv().await.unwrap().unwrap();
            match decode(&bytes).unwrap() {
                Message::ClientReady(r) => assert_eq!(r.client_id, "test-client"),
                other => panic!("expected client_ready, got {:?}", other),
            }

            server_transport
                .send(encode(&Message::AudioChunk(AudioChunkMsg {
                    timestamp: 0.0,
                    sequence: 0,
                    data: vec![1, 2, 3, 4],
                })))
                .await
                .unwrap();

            // Ready -> Playing requires at least two buffered frames.
            server_transport
                .send(encode(&Message::AudioChunk(AudioChunkMsg {
                    timestamp: 10.0,
                    sequence: 1,
                    data: vec![5, 6, 7, 8],
                })))
                .await
                .unwrap();
        });

        tokio::time::timeout(Duration::from_secs(1), async {
            tokio::select! {
                result = session.run() => { result.unwrap(); }
                _ = tokio::time::sleep(Duration::from_millis(200)) => {}
            }
        })
        .await
        .unwrap();

        server.await.unwrap();
        assert_eq!(session.state(), SessionState::Playing);
        assert!(session.estimator().converged());
    }

    #[tokio::test]
    async fn audio_chunk_racing_sync_response_does_not_kill_session() {
        let (sink_transport, mut server_transport) = duplex::pair(16);
        let mut session = SinkSession::new(
            Box::new(sink_transport),
            Box::new(NullPlayback::default()),
            Arc::new(MonotonicClock::new()),
            "test-client".to_string(),
            200.0,
        );

        let server = tokio::spawn(async move {
            server_transport.send(encode(&Message::ServerInfo(server_info()))).await.unwrap();

            let bytes = server_transport.recv().await.unwrap().unwrap();
            let req = match decode(&bytes).unwrap() {
                Message::SyncRequest(r) => r,
                other => panic!("expected sync_request, got {:?}", other),
            };

            // Two concurrent producers share this sink's outbound channel
            // on the real source; an audio_chunk can land ahead of the
            // sync_response it raced with.
            server_transport
                .send(encode(&Message::AudioChunk(AudioChunkMsg {
                    timestamp: 0.0,
                    sequence: 0,
                    data: vec![1, 2, 3, 4],
                })))
                .await
                .unwrap();
            server_transport
                .send(encode(&Message::SyncResponse(SyncResponse { t1: req.t1, t2: req.t1, t3: req.t1 })))
                .await
                .unwrap();

            let bytes = server_transport.recv().await.unwrap().unwrap();
            match decode(&bytes).unwrap() {
                Message::ClientReady(r) => assert_eq!(r.client_id, "test-client"),
                other => panic!("expected client_ready, got {:?}", other),
            }
        });

        tokio::time::timeout(Duration::from_secs(1), async {
            tokio::select! {
                result = session.run() => { result.unwrap(); }
                _ = tokio::time::sleep(Duration::from_millis(200)) => {}
            }
        })
        .await
        .unwrap();

        server.await.unwrap();
        assert!(session.estimator().converged());
        assert_eq!(session.stats().sync_exchanges, 1);
    }

    #[tokio::test]
    async fn format_mismatch_is_rejected_before_any_sync() {
        let (sink_transport, mut server_transport) = duplex::pair(4);
        let mut session = SinkSession::new(
            Box::new(sink_transport),
            Box::new(NullPlayback::default()),
            Arc::new(MonotonicClock::new()),
            "test-client".to_string(),
            200.0,
        );

        let mut bad_info = server_info();
        bad_info.sample_rate = 44_100;
        tokio::spawn(async move {
            server_transport.send(encode(&Message::ServerInfo(bad_info))).await.unwrap();
        });

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, SinkError::FormatMismatch { .. }));
        assert_eq!(session.state(), SessionState::DescriptorPending);
    }
}
