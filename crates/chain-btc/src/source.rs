//! Retrieval collaborators.
//!
//! The preparation pipeline only talks to the chain through these traits;
//! errors are expected to be [`BtcError::UpstreamRetrieval`] and are
//! propagated unchanged.

use std::future::Future;

use crate::error::BtcError;
use crate::fee::FeeRateTiers;
use crate::network::BtcNetwork;
use crate::utxo::SpendableOutput;

/// Lists spendable outputs for an address.
pub trait UtxoSource {
    /// Every currently-unspent output owned by `address`.
    fn fetch_unspent_outputs(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<SpendableOutput>, BtcError>> + Send;

    /// Outputs of `address` carrying an inscription or similar payload.
    fn fetch_payload_marked_outputs(
        &self,
        network: BtcNetwork,
        address: &str,
    ) -> impl Future<Output = Result<Vec<SpendableOutput>, BtcError>> + Send;
}

/// Reports the network's current fee-rate tiers.
pub trait FeeRateSource {
    fn fetch_fee_rate_tiers(
        &self,
        network: BtcNetwork,
    ) -> impl Future<Output = Result<FeeRateTiers, BtcError>> + Send;
}

/// Fetches serialized transactions by id.
pub trait RawTransactionSource {
    fn fetch_raw_transaction(
        &self,
        txid: &str,
    ) -> impl Future<Output = Result<Vec<u8>, BtcError>> + Send;
}
