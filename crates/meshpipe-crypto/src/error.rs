use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("unsupported key length: {0} bytes (expected 1, 16, or 32)")]
    UnsupportedLength(usize),

    #[error("key '{description}' is not valid base64: {source}")]
    InvalidBase64 {
        description: String,
        source: base64::DecodeError,
    },
}

pub type Result<T> = std::result::Result<T, KeyError>;
