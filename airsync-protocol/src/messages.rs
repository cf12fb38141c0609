//! The six wire messages, one constructor per tag. Re-expressed from the
//! source project's own discriminated-tag design as a plain Rust sum
//! type — see [`crate::codec`] for how each variant maps onto the
//! MessagePack fixmap on the wire.

/// `server_info`: emitted once per sink, immediately on connect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub chunk_duration_ms: u32,
    pub server_start_time: f64,
}

/// `sync_request`: sink stamps `t1` and sends this immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncRequest {
    pub t1: f64,
}

/// `sync_response`: the source's reply, carrying the sink's own `t1`
/// back plus the two source-side timestamps needed to derive offset/RTT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncResponse {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
}

/// `audio_chunk`: one PCM frame, stamped at enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunkMsg {
    pub timestamp: f64,
    pub sequence: u32,
    pub data: Vec<u8>,
}

/// `client_ready`: sent once the sink's estimator has converged.
/// Idempotent — the source may see this more than once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientReady {
    pub client_id: String,
}

/// `error`: either side may send this; it carries no recovery semantics
/// of its own beyond surfacing `message` to the peer's log.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMsg {
    pub message: String,
}

/// Top-level message envelope. One constructor per tag in the wire
/// protocol table.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ServerInfo(ServerInfo),
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
    AudioChunk(AudioChunkMsg),
    ClientReady(ClientReady),
    Error(ErrorMsg),
}

impl Message {
    /// The tag string written as the `"type"` key on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::ServerInfo(_) => "server_info",
            Message::SyncRequest(_) => "sync_request",
            Message::SyncResponse(_) => "sync_response",
            Message::AudioChunk(_) => "audio_chunk",
            Message::ClientReady(_) => "client_ready",
            Message::Error(_) => "error",
        }
    }
}
