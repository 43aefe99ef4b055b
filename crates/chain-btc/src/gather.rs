use std::collections::HashSet;

use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::source::UtxoSource;
use crate::utxo::SpendableOutput;

/// Outputs that may fund a payment from one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    /// Unspent outputs minus payload-marked ones, in source order.
    pub fundable: Vec<SpendableOutput>,
    /// Whether the pinned output is itself one of the address's unspent
    /// outputs. Always `false` without a pinned output.
    pub pinned_is_own_funds: bool,
}

/// Gather the fundable candidates for `address`.
///
/// Both listings are requested concurrently and both must succeed; a failure
/// of either aborts gathering with that error.
pub async fn gather_candidates<S: UtxoSource>(
    source: &S,
    network: BtcNetwork,
    address: &str,
    pinned: Option<&SpendableOutput>,
) -> Result<CandidateSet, BtcError> {
    let (unspent, marked) = futures::try_join!(
        source.fetch_unspent_outputs(address),
        source.fetch_payload_marked_outputs(network, address),
    )?;

    let pinned_is_own_funds = pinned.is_some_and(|p| unspent.iter().any(|u| u.same_outpoint(p)));

    let marked: HashSet<(String, u32)> = marked.iter().map(SpendableOutput::outpoint_key).collect();
    let fundable: Vec<SpendableOutput> = unspent
        .into_iter()
        .filter(|u| !marked.contains(&u.outpoint_key()))
        .collect();

    log::debug!(
        "gathered {} fundable outputs for {address} ({} payload-marked excluded, pinned own funds: {pinned_is_own_funds})",
        fundable.len(),
        marked.len(),
    );

    Ok(CandidateSet {
        fundable,
        pinned_is_own_funds,
    })
}
