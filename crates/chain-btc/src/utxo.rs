use crate::address::input_kind;
use crate::fee::{estimate_fee, FeeRate, InputKind, DEFAULT_OUTPUT_WEIGHT};

/// A single unspent transaction output (UTXO).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendableOutput {
    /// Transaction ID as a hex string (big-endian / display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub amount_sat: u64,
    /// Address owning the output.
    pub address: String,
    /// Serialized parent transaction, when the caller already has it.
    pub raw_tx: Option<Vec<u8>>,
}

impl SpendableOutput {
    pub fn new(txid: impl Into<String>, vout: u32, amount_sat: u64, address: impl Into<String>) -> Self {
        Self {
            txid: txid.into(),
            vout,
            amount_sat,
            address: address.into(),
            raw_tx: None,
        }
    }

    /// Whether both refer to the same `(txid, vout)`.
    pub fn same_outpoint(&self, other: &SpendableOutput) -> bool {
        self.vout == other.vout && self.txid.eq_ignore_ascii_case(&other.txid)
    }

    /// Outpoint key normalised for hashing.
    pub fn outpoint_key(&self) -> (String, u32) {
        (self.txid.to_ascii_lowercase(), self.vout)
    }
}

/// A payment destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub address: String,
    pub amount_sat: u64,
}

impl Recipient {
    pub fn new(address: impl Into<String>, amount_sat: u64) -> Self {
        Self {
            address: address.into(),
            amount_sat,
        }
    }
}

/// Total value of a set of outputs. Accumulated in `u128` so it cannot
/// overflow.
pub fn sum_values(outputs: &[SpendableOutput]) -> u128 {
    outputs.iter().map(|o| o.amount_sat as u128).sum()
}

/// Total amount owed to a set of recipients.
pub fn total_amount(recipients: &[Recipient]) -> u128 {
    recipients.iter().map(|r| r.amount_sat as u128).sum()
}

/// Put `pinned` at the front of `selection` unless it is already present.
pub fn ensure_pinned(
    mut selection: Vec<SpendableOutput>,
    pinned: Option<&SpendableOutput>,
) -> Vec<SpendableOutput> {
    if let Some(pinned) = pinned {
        if !selection.iter().any(|u| u.same_outpoint(pinned)) {
            selection.insert(0, pinned.clone());
        }
    }
    selection
}

/// Picks the inputs that fund a payment.
///
/// Implementations must be deterministic for identical arguments. The order
/// of the returned inputs is kept in the assembled transaction.
pub trait CoinSelector {
    fn select_inputs(
        &self,
        target_sat: u64,
        fee_rate: FeeRate,
        candidates: &[SpendableOutput],
        pinned: Option<&SpendableOutput>,
    ) -> Vec<SpendableOutput>;
}

/// Largest-first coin selection.
///
/// The pinned output (if any) is taken first, then candidates by descending
/// value until `target + fee` is covered. The fee assumes two P2WPKH-sized
/// outputs (recipient + change). When the candidates cannot cover the target
/// everything is returned and the caller decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFirstSelector;

impl CoinSelector for LargestFirstSelector {
    fn select_inputs(
        &self,
        target_sat: u64,
        fee_rate: FeeRate,
        candidates: &[SpendableOutput],
        pinned: Option<&SpendableOutput>,
    ) -> Vec<SpendableOutput> {
        let outputs = [DEFAULT_OUTPUT_WEIGHT; 2];

        let mut selected: Vec<SpendableOutput> = pinned.into_iter().cloned().collect();
        let mut kinds: Vec<InputKind> = selected.iter().map(|u| input_kind(&u.address)).collect();
        let mut total = sum_values(&selected);

        let covered = |total: u128, kinds: &[InputKind]| {
            !kinds.is_empty()
                && total >= target_sat as u128 + estimate_fee(kinds, &outputs, fee_rate) as u128
        };

        if covered(total, &kinds) {
            return selected;
        }

        // Sort by value descending (largest first), stable on ties.
        let mut sorted: Vec<&SpendableOutput> = candidates
            .iter()
            .filter(|u| pinned.map_or(true, |p| !u.same_outpoint(p)))
            .collect();
        sorted.sort_by(|a, b| b.amount_sat.cmp(&a.amount_sat));

        for utxo in sorted {
            selected.push(utxo.clone());
            kinds.push(input_kind(&utxo.address));
            total += utxo.amount_sat as u128;

            if covered(total, &kinds) {
                break;
            }
        }

        selected
    }
}
