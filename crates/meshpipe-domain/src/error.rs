use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid shortname pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("store error: {0}")]
    StoreError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
