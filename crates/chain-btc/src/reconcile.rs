use crate::address::{input_kind, parse_address};
use crate::error::BtcError;
use crate::fee::{estimate_fee, output_weight, FeeRateChoice, FeeTier, InputKind};
use crate::network::BtcNetwork;
use crate::utxo::{sum_values, Recipient, SpendableOutput};

/// Everything the reconciliation step sees.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileRequest<'a> {
    /// The full fundable candidate set.
    pub candidates: &'a [SpendableOutput],
    /// The selection made at the provisional fee rate.
    pub provisional: &'a [SpendableOutput],
    pub provisional_total: u128,
    pub target_sat: u64,
    pub recipients: &'a [Recipient],
    pub fee_rate: FeeRateChoice,
    /// Funding address; change returns here.
    pub funding_address: &'a str,
    pub network: BtcNetwork,
    pub pinned: Option<&'a SpendableOutput>,
}

/// A selection priced at the authoritative fee rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub selection: Vec<SpendableOutput>,
    pub fee_sat: u64,
}

/// Reprices a provisional selection against the authoritative fee rate,
/// growing it if the real fee needs more input value.
pub trait FeeReconciler {
    fn reconcile(&self, request: &ReconcileRequest<'_>) -> Result<Reconciled, BtcError>;
}

/// Reconciles using weight-based size estimates.
///
/// The transaction is priced with every recipient output plus a change
/// output to the funding address. While the selection does not cover
/// `target + fee` the largest remaining candidate is added. When candidates
/// run out the grown selection is returned as-is; the orchestrator rejects it.
#[derive(Debug, Clone, Copy, Default)]
pub struct VsizeFeeReconciler {
    pub tier: FeeTier,
}

impl VsizeFeeReconciler {
    pub fn new(tier: FeeTier) -> Self {
        Self { tier }
    }
}

impl FeeReconciler for VsizeFeeReconciler {
    fn reconcile(&self, request: &ReconcileRequest<'_>) -> Result<Reconciled, BtcError> {
        let rate = request.fee_rate.resolve(self.tier);

        let mut outputs = Vec::with_capacity(request.recipients.len() + 1);
        for recipient in request.recipients.iter().map(|r| r.address.as_str()).chain([request.funding_address]) {
            let script = parse_address(recipient, request.network)
                .map_err(|e| BtcError::Reconciliation(e.to_string()))?
                .script_pubkey();
            outputs.push(output_weight(script.len()));
        }

        let mut selection = request.provisional.to_vec();
        let mut kinds: Vec<InputKind> = selection.iter().map(|u| input_kind(&u.address)).collect();
        let mut total = sum_values(&selection);

        let mut remaining: Vec<&SpendableOutput> = request
            .candidates
            .iter()
            .filter(|c| !selection.iter().any(|s| s.same_outpoint(c)))
            .collect();
        // Largest last so `pop` yields the biggest remaining candidate.
        remaining.sort_by(|a, b| a.amount_sat.cmp(&b.amount_sat));

        loop {
            let fee_sat = estimate_fee(&kinds, &outputs, rate);
            if total >= request.target_sat as u128 + fee_sat as u128 {
                return Ok(Reconciled { selection, fee_sat });
            }
            let Some(next) = remaining.pop() else {
                log::debug!(
                    "reconciliation exhausted candidates: have {total} sat, need {} sat",
                    request.target_sat as u128 + fee_sat as u128
                );
                return Ok(Reconciled { selection, fee_sat });
            };
            kinds.push(input_kind(&next.address));
            total += next.amount_sat as u128;
            selection.push(next.clone());
        }
    }
}
