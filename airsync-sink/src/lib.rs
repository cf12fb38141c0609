//! Everything a sink needs beyond the shared `airsync-*` crates: the
//! jitter buffer, the transport trait and its WebSocket/in-memory
//! implementations, and the session state machine that ties a transport,
//! a clock, and a playback shim into one running sink.

pub mod error;
pub mod jitter_buffer;
pub mod session;
pub mod transport;

pub use error::SinkError;
pub use jitter_buffer::{BufferedFrame, InsertOutcome, JitterBuffer};
pub use session::{SessionState, SinkSession, SinkStats};
pub use transport::{SinkTransport, WsSinkTransport};
