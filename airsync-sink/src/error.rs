use airsync_config::PcmFormat;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("playback sink rejected a frame: {0}")]
    Playback(std::io::Error),

    #[error("malformed message on the wire: {0}")]
    Protocol(#[from] airsync_protocol::MalformedMessage),

    #[error("server announced format {announced:?}, this sink only supports {supported:?}")]
    FormatMismatch { announced: PcmFormat, supported: PcmFormat },

    #[error("expected {expected}, got {got} message")]
    UnexpectedMessage { expected: &'static str, got: &'static str },

    #[error("transport closed before the session reached {0}")]
    ClosedEarly(&'static str),
}
