use std::time::Duration;

use chain_btc::error::BtcError;
use chain_stx::error::StxError;
use thiserror::Error;

/// Errors surfaced by a preparation call.
///
/// Chain errors keep their own codes, so [`PrepError::code`] tells funds
/// insufficiency apart from infrastructure failure whatever layer raised it.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("BTC: {0}")]
    Btc(BtcError),

    #[error("STX: {0}")]
    Stx(StxError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("preparation timed out after {0:?}")]
    Timeout(Duration),
}

impl PrepError {
    pub fn code(&self) -> &'static str {
        match self {
            PrepError::Btc(e) => e.code(),
            PrepError::Stx(e) => e.code(),
            PrepError::InvalidConfig(_) => "INVALID_CONFIG",
            PrepError::Timeout(_) => "TIMEOUT",
        }
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, PrepError::Btc(e) if e.is_insufficient_funds())
    }
}

impl From<BtcError> for PrepError {
    fn from(e: BtcError) -> Self {
        PrepError::Btc(e)
    }
}

impl From<StxError> for PrepError {
    fn from(e: StxError) -> Self {
        PrepError::Stx(e)
    }
}
