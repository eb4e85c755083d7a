use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("envelope decode failed: {0}")]
    Envelope(#[from] prost::DecodeError),

    #[error("service envelope carries no packet")]
    MissingPacket,

    #[error("plaintext parsed to an empty structure")]
    EmptyData,

    #[error("payload is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
