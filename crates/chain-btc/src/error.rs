use thiserror::Error;

/// Bitcoin preparation errors.
///
/// Every variant maps to a stable code via [`BtcError::code`] so callers can
/// tell funds insufficiency apart from transient infrastructure failures.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("insufficient funds: have {available} sat, need {required} sat")]
    InsufficientFunds { required: u128, available: u128 },

    #[error("upstream retrieval failed: {0}")]
    UpstreamRetrieval(String),

    #[error("fee reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid fee rate: {0}")]
    InvalidFeeRate(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}

impl BtcError {
    /// Machine-readable error code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            BtcError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            BtcError::UpstreamRetrieval(_) => "UPSTREAM_RETRIEVAL_FAILURE",
            BtcError::Reconciliation(_) => "RECONCILIATION_FAILURE",
            BtcError::InvalidAddress(_) => "INVALID_ADDRESS",
            BtcError::InvalidFeeRate(_) => "INVALID_FEE_RATE",
            BtcError::TransactionBuildError(_) => "TRANSACTION_BUILD_ERROR",
            BtcError::InvalidNetwork(_) => "INVALID_NETWORK",
        }
    }

    /// True for errors caused by missing value rather than infrastructure.
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, BtcError::InsufficientFunds { .. })
    }
}
