use thiserror::Error;

/// Stacks transaction handling errors.
#[derive(Debug, Error)]
pub enum StxError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("unsupported authorization: {0}")]
    UnsupportedAuth(String),
}

impl StxError {
    pub fn code(&self) -> &'static str {
        match self {
            StxError::Serialization(_) => "STX_SERIALIZATION_ERROR",
            StxError::InvalidSignature(_) => "STX_INVALID_SIGNATURE",
            StxError::UnsupportedAuth(_) => "STX_UNSUPPORTED_AUTH",
        }
    }
}
