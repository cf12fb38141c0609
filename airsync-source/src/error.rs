#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message on the wire: {0}")]
    Protocol(#[from] airsync_protocol::MalformedMessage),

    #[error("capture source failed: {0}")]
    Capture(std::io::Error),

    #[error("expected {expected}, got {got} message")]
    UnexpectedMessage { expected: &'static str, got: &'static str },
}
