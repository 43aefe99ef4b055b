//! Fee-aware input selection.
//!
//! The exact fee depends on the selected inputs and the selection depends on
//! the fee, so selection runs in two passes:
//!
//! 1. a provisional pass at a placeholder (or caller-supplied) rate, which
//!    rejects structurally short candidate sets before any fee lookup;
//! 2. a reconciliation pass at the authoritative rate, which may grow the
//!    selection. Its result must still hold the pinned input and is
//!    re-checked before change is computed.

use crate::error::BtcError;
use crate::fee::{FeeRate, FeeRateChoice};
use crate::network::BtcNetwork;
use crate::reconcile::{FeeReconciler, ReconcileRequest};
use crate::source::FeeRateSource;
use crate::utxo::{ensure_pinned, sum_values, total_amount, CoinSelector, Recipient, SpendableOutput};

/// Inputs to one selection run.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub candidates: &'a [SpendableOutput],
    pub recipients: &'a [Recipient],
    /// Caller override; when set it is used in both passes and no fee
    /// tiers are fetched.
    pub fee_rate_override: Option<FeeRate>,
    /// Placeholder rate for the provisional pass.
    pub provisional_fee_rate: FeeRate,
    pub funding_address: &'a str,
    pub network: BtcNetwork,
    /// Output that must be spent regardless of what selection prefers.
    pub pinned: Option<&'a SpendableOutput>,
}

/// Final selected inputs, fee and change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    pub selected: Vec<SpendableOutput>,
    pub fee_sat: u64,
    /// `sum(selected) - target - fee`; zero means no change output.
    pub change_sat: u64,
}

impl SelectionResult {
    pub fn total_sat(&self) -> u128 {
        sum_values(&self.selected)
    }
}

/// Runs provisional selection and fee reconciliation.
pub struct SelectionOrchestrator<'a, F, S, R> {
    fee_source: &'a F,
    selector: &'a S,
    reconciler: &'a R,
}

impl<'a, F, S, R> SelectionOrchestrator<'a, F, S, R>
where
    F: FeeRateSource,
    S: CoinSelector,
    R: FeeReconciler,
{
    pub fn new(fee_source: &'a F, selector: &'a S, reconciler: &'a R) -> Self {
        Self {
            fee_source,
            selector,
            reconciler,
        }
    }

    pub async fn select(&self, request: &SelectionRequest<'_>) -> Result<SelectionResult, BtcError> {
        let target = total_amount(request.recipients);
        let target_sat = u64::try_from(target).map_err(|_| BtcError::InsufficientFunds {
            required: target,
            available: sum_values(request.candidates),
        })?;

        // Provisional pass.
        let provisional_rate = request
            .fee_rate_override
            .unwrap_or(request.provisional_fee_rate);
        let provisional = ensure_pinned(
            self.selector.select_inputs(
                target_sat,
                provisional_rate,
                request.candidates,
                request.pinned,
            ),
            request.pinned,
        );
        let provisional_total = sum_values(&provisional);

        if provisional_total < target {
            log::debug!(
                "provisional selection short: {provisional_total} of {target} sat from {} inputs",
                provisional.len()
            );
            return Err(BtcError::InsufficientFunds {
                required: target,
                available: provisional_total,
            });
        }

        // Authoritative pass.
        let fee_rate = match request.fee_rate_override {
            Some(rate) => FeeRateChoice::Override(rate),
            None => FeeRateChoice::Tiers(self.fee_source.fetch_fee_rate_tiers(request.network).await?),
        };

        let reconciled = self.reconciler.reconcile(&ReconcileRequest {
            candidates: request.candidates,
            provisional: &provisional,
            provisional_total,
            target_sat,
            recipients: request.recipients,
            fee_rate,
            funding_address: request.funding_address,
            network: request.network,
            pinned: request.pinned,
        })?;

        // The fee was priced for the reconciled inputs, so a dropped pinned
        // input cannot be added back here.
        if let Some(pinned) = request.pinned {
            if !reconciled.selection.iter().any(|u| u.same_outpoint(pinned)) {
                return Err(BtcError::Reconciliation(format!(
                    "selection dropped the pinned input {}:{}",
                    pinned.txid, pinned.vout
                )));
            }
        }
        let selected = reconciled.selection;
        if selected.len() != provisional.len() {
            log::debug!(
                "reconciliation changed selection from {} to {} inputs",
                provisional.len(),
                selected.len()
            );
        }

        let total = sum_values(&selected);
        let required = target + reconciled.fee_sat as u128;
        if total < required {
            return Err(BtcError::InsufficientFunds {
                required,
                available: total,
            });
        }

        // Saturates if the total exceeds u64.
        let change_sat = u64::try_from(total - required).unwrap_or(u64::MAX);

        Ok(SelectionResult {
            selected,
            fee_sat: reconciled.fee_sat,
            change_sat,
        })
    }
}
