use thiserror::Error;

/// Everything that can go wrong decoding a wire message. A `decode`
/// failure never panics and never takes down the channel by itself —
/// the caller logs and drops the message, per the error handling design.
#[derive(Error, Debug)]
pub enum MalformedMessage {
    #[error("unknown message tag {0:?}")]
    UnknownTag(String),
    #[error("missing or misordered field {0:?}")]
    MissingField(&'static str),
    #[error("field {0:?} out of range")]
    OutOfRange(&'static str),
    #[error("binary blob length mismatch for field {0:?}")]
    LengthMismatch(&'static str),
    #[error("truncated or malformed MessagePack payload: {0}")]
    Encoding(String),
}
