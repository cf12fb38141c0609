//! Wire codec for the synchronized playback protocol.
//!
//! Every message is a single self-delimited MessagePack fixmap carrying a
//! small tagged map with named fields — see [`codec`] for the byte
//! layout and [`messages`] for the six message shapes.

pub mod codec;
pub mod error;
pub mod messages;

pub use codec::{decode, encode};
pub use error::MalformedMessage;
pub use messages::{AudioChunkMsg, ClientReady, ErrorMsg, Message, ServerInfo, SyncRequest, SyncResponse};
